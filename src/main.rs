use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use brewery_pipeline::{extract, pipeline, transform, PipelineConfig, PipelineError};

#[derive(Parser)]
#[command(
    name = "brewery_pipeline",
    about = "Open Brewery DB → bronze parquet → silver → gold star schema CSVs"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Breweries endpoint (without query string)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Number of pages to request
    #[arg(long, global = true)]
    pages: Option<u32>,

    /// Records per page
    #[arg(long, global = true)]
    per_page: Option<u32>,

    /// Root directory for bronze/ and gold/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Country kept by the silver layer
    #[arg(long, global = true)]
    country: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract + transform (default)
    Run,
    /// Fetch pages and write the bronze parquet file only
    Extract,
    /// Build silver/gold from an existing bronze file
    Transform {
        /// Bronze parquet file (default: <data-dir>/bronze/breweries_raw.parquet)
        #[arg(long)]
        raw: Option<PathBuf>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load().context("Failed to load BREWERY_* settings")?;

    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(pages) = cli.pages {
        config.pages = pages;
    }
    if let Some(per_page) = cli.per_page {
        config.per_page = per_page;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(country) = &cli.country {
        config.target_country = country.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn execute(command: Commands, config: &PipelineConfig) -> Result<(), PipelineError> {
    match command {
        Commands::Run => {
            pipeline::run(config).await?;
        }
        Commands::Extract => {
            config.ensure_dirs()?;
            let path = extract::run(config).await?;
            println!("Bronze file: {}", path.display());
        }
        Commands::Transform { raw } => {
            config.ensure_dirs()?;
            let raw = raw.unwrap_or_else(|| config.raw_artifact());
            let report = transform::run(config, &raw)?;
            println!(
                "Saved {} facts, {} locations, {} types to {}",
                report.gold.facts,
                report.gold.locations,
                report.gold.types,
                report.gold_dir.display()
            );
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let command = cli.command.unwrap_or(Commands::Run);
    match execute(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            error!(error = %err, code, "pipeline aborted");
            eprintln!("Error: {:?}", anyhow::Error::from(err));
            ExitCode::from(code)
        }
    }
}
