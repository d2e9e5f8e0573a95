use anyhow::Context;
use clap::{Parser, Subcommand};
use pnatrans_etl::config::{database_path_from_url, Config};
use pnatrans_etl::constants::{DEATHS_TABLE, PRODUCTS_RAW_TABLE, PRODUCTS_TABLE};
use pnatrans_etl::metrics::{init_metrics, ReconcileMetrics};
use pnatrans_etl::logging;
use pnatrans_etl::pipeline::processing::{ReconcileOptions, ReconcileOutcome, Reconciler};
use pnatrans_etl::pipeline::{IngestionPipeline, PipelineResult};
use pnatrans_etl::query_cache::{QueryCache, SqliteTableSource};
use pnatrans_etl::regions::{verify_region_table, RegionCode};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pnatrans")]
#[command(about = "Training-records ingestion and regional reconciliation")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the training spreadsheet into the store (full replace)
    Ingest {
        /// Config file (defaults to ./pnatrans.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Spreadsheet to read instead of <sheets_dir>/<source_file>
        #[arg(long)]
        file: Option<PathBuf>,
        /// Number of parallel writers
        #[arg(long)]
        workers: Option<usize>,
        /// Database URL, e.g. sqlite://data/pnatrans.db
        #[arg(long)]
        database: Option<String>,
        /// Print the run result as JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
    /// Reconcile products and transport deaths per region
    Reconcile {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        database: Option<String>,
        /// Region codes to keep (comma-separated), e.g. SP,RJ
        #[arg(long)]
        regions: Option<String>,
        /// Also write the reconciled table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Verify the region name table against the valid codes
    CheckRegions,
}

fn load_config(path: Option<PathBuf>, database: Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::load(path.as_deref()).context("loading configuration")?;
    if let Some(url) = database {
        config.database_url = url;
    }
    Ok(config)
}

fn parse_regions(list: &str) -> Vec<RegionCode> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let code = RegionCode::parse(s);
            if code.is_none() {
                warn!("Ignoring unknown region code '{}'", s.trim());
            }
            code
        })
        .collect()
}

fn print_ingest_summary(result: &PipelineResult) {
    println!("\n📊 Ingestion results for {}:", result.source.display());
    println!("   Rows extracted: {}", result.rows_extracted);
    println!("   Clean records: {}", result.normalize.rows_out);
    println!("   Dropped (no date): {}", result.normalize.dropped_missing_date);
    println!("   Table rebuilt: {}", result.schema_rebuilt);
    println!("   Workers: {}", result.write.workers);
    println!(
        "   Chunks: {} dispatched, {} failed",
        result.write.chunks_dispatched, result.write.chunks_failed
    );
    println!("   Rows written: {}", result.rows_written());
    println!("   Duration: {:.2}s", result.duration_secs);

    if !result.write.failures.is_empty() {
        println!("\n⚠️  Chunks not persisted:");
        for failure in &result.write.failures {
            println!("   - chunk {} ({} rows): {}", failure.chunk, failure.rows, failure.error);
        }
    }
}

fn print_reconciled(outcome: &ReconcileOutcome) {
    if outcome.insufficient_data {
        println!("\nℹ️  Insufficient data to reconcile: both sources total zero.");
        return;
    }
    println!("\n{:<6} {:>14} {:>14} {:>12}", "UF", "metric_a", "metric_b", "rate");
    for row in &outcome.table.rows {
        println!(
            "{:<6} {:>14.2} {:>14.2} {:>12.4}",
            row.region_code, row.metric_a, row.metric_b, row.derived_rate
        );
    }
    println!(
        "\n   {} regions, {} rows with unknown codes, {} unmapped names",
        outcome.table.len(),
        outcome.stats.rows_a_discarded,
        outcome.stats.rows_b_unmapped
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config_path, database) = match &cli.command {
        Commands::Ingest { config, database, .. } | Commands::Reconcile { config, database, .. } => {
            (config.clone(), database.clone())
        }
        Commands::CheckRegions => (None, None),
    };
    let mut config = load_config(config_path, database)?;

    let _log_guard = logging::init_logging(&config.log_dir);
    init_metrics(config.metrics_addr.as_deref());

    if let Err(e) = verify_region_table() {
        error!("Region table self-check failed: {}", e);
        return Err(e.into());
    }

    match cli.command {
        Commands::Ingest {
            file, workers, json, ..
        } => {
            println!("🔄 Running ingestion pipeline...");
            if let Some(file) = file {
                if let Some(dir) = file.parent() {
                    config.sheets_dir = dir.to_path_buf();
                }
                if let Some(name) = file.file_name() {
                    config.source_file = name.to_string_lossy().into_owned();
                }
            }
            if workers.is_some() {
                config.workers = workers;
            }
            config.validate()?;

            let result = IngestionPipeline::new(config).run().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_ingest_summary(&result);
            }
        }
        Commands::Reconcile { regions, csv, .. } => {
            println!("🔄 Reconciling regional datasets...");
            let cache = QueryCache::new(
                SqliteTableSource::new(database_path_from_url(&config.database_url)),
                Duration::from_secs(config.cache_ttl_secs),
                Duration::from_secs(config.reference_ttl_secs),
            );
            let products = cache.load_first_available(&[PRODUCTS_TABLE, PRODUCTS_RAW_TABLE]);
            let deaths = cache.load(DEATHS_TABLE);

            let mut outcome = Reconciler::new(ReconcileOptions::default()).reconcile(&products, &deaths);
            ReconcileMetrics::record_outcome(&outcome);

            if let Some(list) = regions {
                let selected = parse_regions(&list);
                outcome.table = outcome.table.filter_regions(&selected);
            }
            print_reconciled(&outcome);

            if let Some(path) = csv {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                outcome.table.write_csv(file)?;
                info!("Reconciled table written to {}", path.display());
                println!("   CSV written to {}", path.display());
            }
        }
        Commands::CheckRegions => {
            println!("✅ Region table is consistent ({} codes)", RegionCode::all().count());
        }
    }

    Ok(())
}
