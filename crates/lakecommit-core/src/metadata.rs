//! Table metadata model.
//!
//! This module defines everything persisted in a table's metadata files:
//!
//! - [`Schema`] / [`NestedField`] / [`PartitionSpec`]: the table layout,
//! - [`DataFile`] / [`Metrics`] / [`Datum`]: descriptors of registered files
//!   and their column statistics,
//! - [`Snapshot`]: immutable versions of the table's file set,
//! - [`TableMetadata`] and [`TableUpdate`]: the full table state and the
//!   ordered updates a commit applies to it.
//!
//! No storage I/O happens here; the catalog owns persistence.

mod data_file;
mod schema;
mod snapshot;
mod table_metadata;

pub use data_file::{DataFile, DataFileBuilder, Datum, FileFormat, Metrics};
pub use schema::{NestedField, PartitionField, PartitionSpec, PrimitiveType, Schema};
pub use snapshot::{
    ADDED_DATA_FILES, ADDED_FILES_SIZE, ADDED_RECORDS, Operation, Snapshot, TOTAL_DATA_FILES,
    TOTAL_FILES_SIZE, TOTAL_RECORDS,
};
pub use table_metadata::{MetadataLogEntry, TABLE_FORMAT_VERSION, TableMetadata, TableUpdate};

use snafu::prelude::*;

/// Convenience alias for metadata results.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while building or evolving table metadata.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetadataError {
    /// Field ids must be positive.
    #[snafu(display("Invalid field id {id}: field ids must be positive"))]
    InvalidFieldId {
        /// The rejected id.
        id: i32,
    },

    /// Two columns share a field id.
    #[snafu(display("Duplicate field id {id} in schema"))]
    DuplicateFieldId {
        /// The duplicated id.
        id: i32,
    },

    /// Two columns share a name.
    #[snafu(display("Duplicate field name {name:?} in schema"))]
    DuplicateFieldName {
        /// The duplicated name.
        name: String,
    },

    /// A mandatory data-file attribute was not provided to the builder.
    #[snafu(display("Data file is missing required field {field}"))]
    MissingDataFileField {
        /// Name of the missing attribute.
        field: &'static str,
    },

    /// A snapshot was built on a snapshot that is no longer current.
    #[snafu(display(
        "Snapshot parent {found:?} does not match current snapshot {expected:?}"
    ))]
    StaleParent {
        /// The table's current snapshot id.
        expected: Option<i64>,
        /// The parent recorded in the new snapshot.
        found: Option<i64>,
    },

    /// A snapshot id that already exists in the table.
    #[snafu(display("Snapshot id {snapshot_id} already exists"))]
    DuplicateSnapshotId {
        /// The reused id.
        snapshot_id: i64,
    },

    /// Any other update that cannot be applied.
    #[snafu(display("Invalid table update: {msg}"))]
    InvalidUpdate {
        /// Why the update was rejected.
        msg: String,
    },
}
