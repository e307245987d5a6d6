use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extract;
use crate::transform::{self, TransformReport};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub raw_path: PathBuf,
    pub transform: TransformReport,
    pub elapsed: Duration,
}

/// Extract, then transform. Nothing flows back; the bronze path is the only handoff.
pub async fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    let started = Instant::now();
    config.validate()?;
    config.ensure_dirs()?;

    let raw_path = extract::run(config).await?;
    let transform = transform::run(config, &raw_path)?;

    let elapsed = started.elapsed();
    println!(
        "[4/4] Pipeline finished successfully in {}",
        format_duration(elapsed)
    );
    info!(
        raw = transform.raw_rows,
        silver = transform.silver_rows,
        facts = transform.gold.facts,
        elapsed_ms = elapsed.as_millis() as u64,
        "pipeline complete"
    );

    Ok(PipelineReport {
        raw_path,
        transform,
        elapsed,
    })
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
