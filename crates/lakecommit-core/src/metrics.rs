//! Column-level statistics for data files.
//!
//! [`parquet_file_metrics`] turns a Parquet footer into [`Metrics`] keyed by
//! table field id, honouring the table's [`MetricsConfig`]:
//!
//! | mode          | column size | value / null counts | bounds          |
//! |---------------|-------------|---------------------|-----------------|
//! | `none`        | yes         | no                  | no              |
//! | `counts`      | yes         | yes                 | no              |
//! | `truncate(n)` | yes         | yes                 | yes, truncated  |
//! | `full`        | yes         | yes                 | yes             |
//!
//! [`Metrics`]: crate::metadata::Metrics

mod config;
mod parquet;
mod truncate;

pub use config::{
    DEFAULT_TRUNCATE_LENGTH, DEFAULT_WRITE_METRICS_MODE, METRICS_MODE_COLUMN_PREFIX,
    MetricsConfig, MetricsMode,
};
pub use self::parquet::{FileMetrics, parquet_file_metrics};
pub use truncate::{
    truncate_binary_max, truncate_binary_min, truncate_string_max, truncate_string_min,
};

use snafu::{Backtrace, prelude::*};

use crate::{storage::StorageError, table::Table};

/// Convenience alias for metrics results.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised while computing file metrics.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetricsError {
    /// A metrics mode string that cannot be parsed.
    #[snafu(display("Invalid metrics mode {value:?}: expected none, counts, full or truncate(<n>)"))]
    InvalidMode {
        /// The rejected value.
        value: String,
    },

    /// The bytes are not a readable Parquet file.
    #[snafu(display("Invalid Parquet file: {source}"))]
    InvalidParquet {
        /// Underlying Parquet error.
        source: ::parquet::errors::ParquetError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The file could not be read from storage.
    #[snafu(display("Failed to read data file for metrics: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },
}

/// Read the data file at `location` through the table's storage I/O and
/// compute its metrics under the table's metrics policy.
pub async fn read_file_metrics(table: &Table, location: &str) -> MetricsResult<FileMetrics> {
    let config = table.metrics_config()?;
    let bytes = table.io().read(location).await.context(StorageSnafu)?;
    tracing::debug!(location, bytes = bytes.len(), "read data file for metrics");

    parquet_file_metrics(bytes, table.schema(), &config)
}
