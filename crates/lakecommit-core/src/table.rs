//! Loaded table handle.

use std::collections::BTreeMap;

use crate::{
    catalog::TableIdent,
    metadata::{DataFile, Schema, Snapshot, TableMetadata},
    metrics::{MetricsConfig, MetricsResult},
    storage::{FileIo, join_location},
    transaction::FastAppend,
};

/// Table property: where new data files are written.
pub const WRITE_DATA_PATH: &str = "write.data.path";
/// Table property: delete metadata versions that fall off the metadata log.
pub const METADATA_DELETE_AFTER_COMMIT: &str = "write.metadata.delete-after-commit.enabled";
/// Table property: how many previous versions the metadata log keeps.
pub const METADATA_PREVIOUS_VERSIONS_MAX: &str = "write.metadata.previous-versions-max";
/// Default for [`METADATA_PREVIOUS_VERSIONS_MAX`].
pub const DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX: usize = 100;

const DEFAULT_DATA_DIR_NAME: &str = "data";

/// A table at one committed version.
///
/// The handle is a snapshot of catalog state: it is never mutated in place.
/// Committing through [`Table::new_append`] returns a new handle for the new
/// version.
#[derive(Debug, Clone)]
pub struct Table {
    ident: TableIdent,
    metadata: TableMetadata,
    version: u64,
    io: FileIo,
}

impl Table {
    pub(crate) fn new(ident: TableIdent, metadata: TableMetadata, version: u64, io: FileIo) -> Self {
        Self {
            ident,
            metadata,
            version,
            io,
        }
    }

    /// Table identifier.
    pub fn ident(&self) -> &TableIdent {
        &self.ident
    }

    /// Full metadata at this version.
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Catalog version this handle was loaded at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Storage I/O for the table's files.
    pub fn io(&self) -> &FileIo {
        &self.io
    }

    /// Base location.
    pub fn location(&self) -> &str {
        self.metadata.location()
    }

    /// Current schema.
    pub fn schema(&self) -> &Schema {
        self.metadata.schema()
    }

    /// Table properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        self.metadata.properties()
    }

    /// Current snapshot, if any data has been committed.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.metadata.current_snapshot()
    }

    /// Live data files, oldest first.
    pub fn data_files(&self) -> Vec<&DataFile> {
        self.metadata.data_files()
    }

    /// Where new data files go.
    pub fn location_provider(&self) -> LocationProvider {
        LocationProvider::for_table(&self.metadata)
    }

    /// Metrics collection policy from the table properties.
    pub fn metrics_config(&self) -> MetricsResult<MetricsConfig> {
        MetricsConfig::from_properties(self.properties())
    }

    /// Start an append of new data files on top of this version.
    pub fn new_append(&self) -> FastAppend {
        FastAppend::new(self.clone())
    }
}

/// Derives locations for new data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationProvider {
    data_location: String,
}

impl LocationProvider {
    fn for_table(metadata: &TableMetadata) -> Self {
        let data_location = match metadata.properties().get(WRITE_DATA_PATH) {
            Some(path) if !path.trim().is_empty() => path.trim_end_matches('/').to_string(),
            _ => join_location(metadata.location(), DEFAULT_DATA_DIR_NAME),
        };
        Self { data_location }
    }

    /// Directory new data files are written under.
    pub fn data_location(&self) -> &str {
        &self.data_location
    }

    /// Fully qualified location for a new data file called `file_name`.
    pub fn new_data_location(&self, file_name: &str) -> String {
        join_location(&self.data_location, file_name)
    }
}
