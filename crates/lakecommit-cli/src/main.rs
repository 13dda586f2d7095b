//! CLI that provisions or loads a table, uploads the bundled sample file, and
//! commits it as a new snapshot.

mod error;
mod logging;

use std::path::PathBuf;

use clap::Parser;
use lakecommit_core::{
    assets::Assets,
    catalog::{TableIdent, load_catalog},
    config::{AppConfig, DEFAULT_NAMESPACE, DEFAULT_TABLE, SAMPLE_ASSET},
    pipeline::{self, AppContext, default_schema},
};
use snafu::ResultExt;
use tracing::Instrument;

use crate::error::{CatalogSnafu, CliResult, ConfigSnafu, PipelineSnafu, SchemaSnafu};

const BUNDLED_SAMPLE: &[u8] = include_bytes!("../assets/sample.parquet");

/// Append the bundled sample Parquet file to a table, creating the table on
/// first use. The warehouse root is read from ICEBERG_WAREHOUSE.
#[derive(Debug, Parser)]
#[command(name = "lakecommit", version, about)]
struct Cli {
    /// Namespace of the target table
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the target table
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Directory containing sample.parquet, replacing the one built into the binary
    #[arg(long = "asset-dir", env = "LAKECOMMIT_ASSET_DIR")]
    asset_dir: Option<PathBuf>,
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init_logging();

    // Configuration is checked before any catalog or storage client exists.
    let config = AppConfig::from_env().context(ConfigSnafu)?;
    let catalog = load_catalog(&config.catalog_properties()).context(CatalogSnafu)?;
    let schema = default_schema().context(SchemaSnafu)?;

    let assets = match cli.asset_dir {
        Some(dir) => Assets::from_dir(dir),
        None => Assets::embedded([(SAMPLE_ASSET, BUNDLED_SAMPLE)]),
    };
    let ident = TableIdent::new(cli.namespace, cli.table);
    let ctx = AppContext::new(catalog, schema, assets)
        .with_ident(ident.clone())
        .with_asset_name(SAMPLE_ASSET);

    let span = tracing::info_span!("run", table = %ident, warehouse = config.warehouse());
    let report = pipeline::run(&ctx, |progress| println!("{progress}"))
        .instrument(span)
        .await
        .context(PipelineSnafu {
            table: ident.to_string(),
        })?;

    tracing::info!(
        table = %report.ident,
        resolution = ?report.resolution,
        location = %report.file.location,
        size = report.file.size,
        snapshot_id = report.snapshot_id,
        records = report.record_count,
        total_data_files = report.total_data_files,
        "run complete"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
