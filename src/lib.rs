//! Open Brewery DB batch job: pull breweries over HTTP into a bronze parquet
//! file, clean them into a silver table, and export a gold star schema
//! (`fact_breweries`, `dim_location`, `dim_brewery_type`) as CSV.

pub mod bronze;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod transform;
pub mod warehouse;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
