//! The four-stage append workflow.
//!
//! ```text
//! START -> TABLE_RESOLVED -> FILE_UPLOADED -> APPENDED -> DONE
//! ```
//!
//! [`run`] drives the stages in order; each stage is also public so it can be
//! exercised on its own with a substituted [`Catalog`]. Every failure aborts
//! the run. There is no compensation: an object uploaded before a failed
//! commit stays where it is.

use std::{fmt, sync::Arc};

use snafu::prelude::*;
use uuid::Uuid;

use crate::{
    assets::{AssetError, Assets},
    catalog::{Catalog, CatalogError, TableCreation, TableIdent},
    config::{DEFAULT_NAMESPACE, DEFAULT_TABLE, SAMPLE_ASSET},
    metadata::{DataFile, FileFormat, MetadataError, NestedField, PrimitiveType, Schema},
    metrics::{self, FileMetrics, MetricsError},
    storage::StorageError,
    table::Table,
    transaction::AppendError,
};

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of one pipeline stage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// Checking, creating, or loading the table failed.
    #[snafu(display("Failed to resolve table {ident}: {source}"))]
    ResolveTable {
        /// Qualified table name.
        ident: String,
        /// Underlying catalog error.
        source: CatalogError,
    },

    /// The bundled asset could not be read.
    #[snafu(display("Failed to read bundled asset: {source}"))]
    ReadAsset {
        /// Underlying asset error.
        source: AssetError,
    },

    /// Writing the data file to object storage failed.
    #[snafu(display("Failed to upload {location}: {source}"))]
    Upload {
        /// Target location.
        location: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Reading statistics from the uploaded file failed.
    #[snafu(display("Failed to read metrics of {location}: {source}"))]
    ReadMetrics {
        /// Data file location.
        location: String,
        /// Underlying metrics error.
        source: MetricsError,
    },

    /// Building the data-file descriptor failed.
    #[snafu(display("Failed to describe data file {location}: {source}"))]
    DescribeFile {
        /// Data file location.
        location: String,
        /// Underlying metadata error.
        source: MetadataError,
    },

    /// Committing the append failed.
    #[snafu(display("Failed to append {location}: {source}"))]
    Append {
        /// Data file location.
        location: String,
        /// Underlying append error.
        source: AppendError,
    },
}

/// Progress events, printed by the CLI as fixed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The run started.
    Starting,
    /// The table does not exist and is being created.
    CreatingTable,
    /// The table exists and is being loaded.
    LoadingTable,
    /// The asset is being uploaded.
    UploadingFile,
    /// Metrics are being read and the file appended.
    AppendingFile,
    /// The run finished.
    Done,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Progress::Starting => "Starting...",
            Progress::CreatingTable => "Creating table...",
            Progress::LoadingTable => "Loading table...",
            Progress::UploadingFile => "Uploading file...",
            Progress::AppendingFile => "Appending file...",
            Progress::Done => "DONE!",
        };
        f.write_str(msg)
    }
}

/// Whether the table was created by this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableResolution {
    /// The table did not exist and was created.
    Created,
    /// The table existed and was loaded.
    Loaded,
}

/// An uploaded data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Fully qualified location.
    pub location: String,
    /// Exact size in bytes.
    pub size: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Table that was appended to.
    pub ident: TableIdent,
    /// Created or loaded.
    pub resolution: TableResolution,
    /// The uploaded file.
    pub file: UploadedFile,
    /// Snapshot produced by the append.
    pub snapshot_id: i64,
    /// Rows in the appended file.
    pub record_count: u64,
    /// Live data files after the append.
    pub total_data_files: usize,
}

/// The fixed demo schema: optional string columns `id` (1) and `name` (2).
pub fn default_schema() -> Result<Schema, MetadataError> {
    Schema::new(
        0,
        vec![
            NestedField::optional(1, "id", PrimitiveType::String),
            NestedField::optional(2, "name", PrimitiveType::String),
        ],
    )
}

/// Collaborators and constants shared by every stage.
#[derive(Debug, Clone)]
pub struct AppContext {
    catalog: Arc<dyn Catalog>,
    ident: TableIdent,
    schema: Schema,
    assets: Assets,
    asset_name: String,
}

impl AppContext {
    /// Context for the demo table `default.athena_test` and the
    /// `sample.parquet` asset.
    pub fn new(catalog: Arc<dyn Catalog>, schema: Schema, assets: Assets) -> Self {
        Self {
            catalog,
            ident: TableIdent::new(DEFAULT_NAMESPACE, DEFAULT_TABLE),
            schema,
            assets,
            asset_name: SAMPLE_ASSET.to_string(),
        }
    }

    /// Use another table.
    pub fn with_ident(mut self, ident: TableIdent) -> Self {
        self.ident = ident;
        self
    }

    /// Upload another asset.
    pub fn with_asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = name.into();
        self
    }

    /// The catalog.
    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Target table.
    pub fn ident(&self) -> &TableIdent {
        &self.ident
    }

    /// Schema used when the table is created.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Bundled assets.
    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    /// Name of the asset to upload.
    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }
}

/// Stage 1: create the table if it is absent, otherwise load it as-is.
pub async fn resolve_table<F>(
    ctx: &AppContext,
    on_progress: &mut F,
) -> PipelineResult<(Table, TableResolution)>
where
    F: FnMut(Progress),
{
    let ident = ctx.ident();
    let context = || ResolveTableSnafu {
        ident: ident.to_string(),
    };

    let exists = ctx
        .catalog()
        .table_exists(ident)
        .await
        .context(context())?;

    if exists {
        on_progress(Progress::LoadingTable);
        let table = ctx.catalog().load_table(ident).await.context(context())?;
        Ok((table, TableResolution::Loaded))
    } else {
        on_progress(Progress::CreatingTable);
        let table = ctx
            .catalog()
            .create_table(ident, TableCreation::new(ctx.schema().clone()))
            .await
            .context(context())?;
        Ok((table, TableResolution::Created))
    }
}

/// Stage 2: copy the bundled asset to a fresh `<uuid>.parquet` location in
/// the table's data directory.
///
/// The asset is read before anything is written, so a missing asset never
/// leaves an object behind.
pub async fn upload_file(ctx: &AppContext, table: &Table) -> PipelineResult<UploadedFile> {
    let bytes = ctx
        .assets()
        .read(ctx.asset_name())
        .await
        .context(ReadAssetSnafu)?;
    let size = bytes.len() as u64;

    let location = table
        .location_provider()
        .new_data_location(&format!("{}.parquet", Uuid::new_v4()));

    table
        .io()
        .write(&location, bytes)
        .await
        .context(UploadSnafu {
            location: location.clone(),
        })?;

    tracing::info!(location = %location, size, "uploaded data file");
    Ok(UploadedFile { location, size })
}

/// Stage 3: compute metrics of the uploaded object from its footer.
pub async fn read_file_metrics(table: &Table, file: &UploadedFile) -> PipelineResult<FileMetrics> {
    metrics::read_file_metrics(table, &file.location)
        .await
        .context(ReadMetricsSnafu {
            location: file.location.clone(),
        })
}

/// Stage 4: register the uploaded file in a new append snapshot.
pub async fn append_file(
    ctx: &AppContext,
    table: &Table,
    file: &UploadedFile,
    file_metrics: FileMetrics,
) -> PipelineResult<Table> {
    let data_file = DataFile::builder()
        .with_path(file.location.clone())
        .with_file_size_in_bytes(file.size)
        .with_format(FileFormat::Parquet)
        .with_metrics(file_metrics.metrics)
        .with_split_offsets(file_metrics.split_offsets)
        .build()
        .context(DescribeFileSnafu {
            location: file.location.clone(),
        })?;

    table
        .new_append()
        .append_file(data_file)
        .commit(ctx.catalog())
        .await
        .context(AppendSnafu {
            location: file.location.clone(),
        })
}

/// Run all four stages, reporting progress through `on_progress`.
pub async fn run<F>(ctx: &AppContext, mut on_progress: F) -> PipelineResult<RunReport>
where
    F: FnMut(Progress),
{
    on_progress(Progress::Starting);
    let (table, resolution) = resolve_table(ctx, &mut on_progress).await?;

    on_progress(Progress::UploadingFile);
    let file = upload_file(ctx, &table).await?;

    on_progress(Progress::AppendingFile);
    let file_metrics = read_file_metrics(&table, &file).await?;
    let record_count = file_metrics.metrics.record_count;
    let committed = append_file(ctx, &table, &file, file_metrics).await?;

    let snapshot_id = committed
        .current_snapshot()
        .map(|s| s.snapshot_id)
        .unwrap_or_default();
    let report = RunReport {
        ident: committed.ident().clone(),
        resolution,
        file,
        snapshot_id,
        record_count,
        total_data_files: committed.data_files().len(),
    };

    on_progress(Progress::Done);
    Ok(report)
}
