use std::path::{Path, PathBuf};

use tracing::info;

use crate::bronze;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::warehouse::{self, GoldCounts};

/// What the transform stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub raw_rows: usize,
    pub silver_rows: usize,
    pub gold: GoldCounts,
    pub gold_dir: PathBuf,
}

/// Bronze → silver → gold → CSV. Any failure is fatal for the run.
pub fn run(config: &PipelineConfig, raw_path: &Path) -> Result<TransformReport> {
    println!("[2/4] Transforming {}...", raw_path.display());

    let raw = bronze::read_bronze(raw_path)?;
    let conn = warehouse::open()?;

    let raw_rows = warehouse::load_raw(&conn, &raw)?;
    info!(rows = raw_rows, "raw_breweries loaded");

    let silver_rows = warehouse::build_silver(&conn, &config.target_country)?;
    println!(" -> Silver layer built ({} rows)", silver_rows);

    let built = warehouse::build_gold(&conn)?;
    println!(
        " -> Gold layer built ({} facts, {} locations, {} types)",
        built.facts, built.locations, built.types
    );

    let gold_dir = config.gold_dir();
    let gold = warehouse::export(&conn, &gold_dir)?;
    println!("[3/4] Gold files exported to {}", gold_dir.display());
    info!(?gold, dir = %gold_dir.display(), "gold exported");

    Ok(TransformReport {
        raw_rows,
        silver_rows,
        gold,
        gold_dir,
    })
}
