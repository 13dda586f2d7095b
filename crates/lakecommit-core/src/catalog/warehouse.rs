//! Storage-backed catalog.
//!
//! Layout under the warehouse root:
//!
//! ```text
//! <warehouse>/
//!   <namespace>.db/
//!     <table>/
//!       metadata/
//!         CURRENT                      # latest committed version (e.g. "3\n")
//!         0000000001.metadata.json     # Commit version 1 (table creation)
//!         0000000002.metadata.json     # Commit version 2
//!       data/                          # data files (default write.data.path)
//! ```
//!
//! Every version file holds a [`Commit`] with the complete resulting
//! [`TableMetadata`], so loading a table reads exactly two objects.
//!
//! ## Concurrency semantics
//!
//! The CURRENT check is advisory. The real guard is the create-only write of
//! the next version file: if two writers race for the same version, exactly
//! one create succeeds and the other gets [`CatalogError::CommitRace`].
//!
//! A writer that crashes after creating version N but before updating CURRENT
//! leaves an orphaned version file. The next writer that loses the race for N
//! reads it; if it is a well-formed commit built on the version CURRENT still
//! names, CURRENT is rolled forward to N and the writer still reports the
//! race, so its retry rebases on N. An orphan that cannot be read, or that
//! was built on another base, is left alone.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, IntoError, prelude::*};

use async_trait::async_trait;

use crate::{
    catalog::{
        Catalog, CatalogError, CatalogResult, CommitRaceSnafu, CorruptMetadataSnafu,
        InvalidUpdateSnafu, StaleBaseSnafu, StorageSnafu, TableAlreadyExistsSnafu, TableCreation,
        TableIdent, TableNotFoundSnafu, VersionConflictSnafu,
    },
    metadata::{MetadataError, MetadataLogEntry, TableMetadata, TableUpdate},
    storage::{FileIo, join_location},
    table::{
        DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX, METADATA_DELETE_AFTER_COMMIT,
        METADATA_PREVIOUS_VERSIONS_MAX, Table,
    },
};

/// One committed table version, as persisted in a version file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Commit {
    /// Version this file represents.
    pub version: u64,
    /// Version the updates were applied to (0 for table creation).
    pub base_version: u64,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Updates applied on top of the base version.
    pub updates: Vec<TableUpdate>,
    /// Complete table metadata after the updates.
    pub metadata: TableMetadata,
}

/// Catalog that stores table metadata as objects under a warehouse root.
#[derive(Debug, Clone)]
pub struct WarehouseCatalog {
    name: String,
    warehouse: String,
    io: FileIo,
    properties: BTreeMap<String, String>,
}

impl WarehouseCatalog {
    /// Name of the per-table metadata directory.
    pub const METADATA_DIR_NAME: &str = "metadata";
    /// Name of the object that stores the current version pointer.
    pub const CURRENT_FILE_NAME: &str = "CURRENT";
    /// Number of digits used in zero-padded version file names.
    pub const VERSION_FILENAME_DIGITS: usize = 10;

    /// Create a catalog rooted at `warehouse`, reading and writing through
    /// `io`. `properties` supply catalog-wide defaults for table properties.
    pub fn new(
        name: impl Into<String>,
        warehouse: impl Into<String>,
        io: FileIo,
        properties: BTreeMap<String, String>,
    ) -> Self {
        let warehouse: String = warehouse.into();
        Self {
            name: name.into(),
            warehouse: warehouse.trim_end_matches('/').to_string(),
            io,
            properties,
        }
    }

    /// Warehouse root location.
    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    /// Storage I/O shared with every table this catalog returns.
    pub fn io(&self) -> &FileIo {
        &self.io
    }

    /// Base location of a table: `<warehouse>/<namespace>.db/<table>`.
    pub fn table_location(&self, ident: &TableIdent) -> String {
        join_location(
            &self.warehouse,
            &format!("{}.db/{}", ident.namespace(), ident.name()),
        )
    }

    fn metadata_dir(&self, ident: &TableIdent) -> String {
        join_location(&self.table_location(ident), Self::METADATA_DIR_NAME)
    }

    fn current_location(&self, ident: &TableIdent) -> String {
        join_location(&self.metadata_dir(ident), Self::CURRENT_FILE_NAME)
    }

    /// Location of the version file for `version`.
    pub fn version_location(&self, ident: &TableIdent, version: u64) -> String {
        let file_name = format!(
            "{:0width$}.metadata.json",
            version,
            width = Self::VERSION_FILENAME_DIGITS
        );
        join_location(&self.metadata_dir(ident), &file_name)
    }

    /// Load the CURRENT version pointer; `None` when the table does not
    /// exist.
    pub async fn load_current_version(&self, ident: &TableIdent) -> CatalogResult<Option<u64>> {
        let location = self.current_location(ident);

        let contents = match self.io.read_to_string(&location).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => return Err(CatalogError::Storage { source }),
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return CorruptMetadataSnafu {
                location,
                msg: "CURRENT is empty",
            }
            .fail();
        }
        let version = trimmed
            .parse::<u64>()
            .map_err(|e| CatalogError::CorruptMetadata {
                msg: format!("CURRENT has invalid content {trimmed:?}: {e}"),
                location: location.clone(),
                backtrace: Backtrace::capture(),
            })?;

        if version == 0 {
            return CorruptMetadataSnafu {
                location,
                msg: "CURRENT points at version 0",
            }
            .fail();
        }
        Ok(Some(version))
    }

    /// Load a single committed version.
    pub async fn load_commit(&self, ident: &TableIdent, version: u64) -> CatalogResult<Commit> {
        let location = self.version_location(ident, version);
        let json = self
            .io
            .read_to_string(&location)
            .await
            .context(StorageSnafu)?;

        let commit: Commit =
            serde_json::from_str(&json).map_err(|e| CatalogError::CorruptMetadata {
                msg: format!("failed to parse version {version}: {e}"),
                location: location.clone(),
                backtrace: Backtrace::capture(),
            })?;

        if commit.version != version {
            return CorruptMetadataSnafu {
                location,
                msg: format!("file records version {}", commit.version),
            }
            .fail();
        }
        Ok(commit)
    }

    /// Serialize `commit` and create its version file. Losing the
    /// create-only race is reported by `on_exists`.
    async fn write_version(
        &self,
        ident: &TableIdent,
        commit: &Commit,
        on_exists: impl FnOnce(crate::storage::StorageError) -> CatalogError,
    ) -> CatalogResult<()> {
        let location = self.version_location(ident, commit.version);
        let json = serde_json::to_vec_pretty(commit).map_err(|e| CatalogError::CorruptMetadata {
            msg: format!("failed to serialize version {}: {e}", commit.version),
            location: location.clone(),
            backtrace: Backtrace::capture(),
        })?;

        match self.io.write_new(&location, Bytes::from(json)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => Err(on_exists(e)),
            Err(source) => Err(CatalogError::Storage { source }),
        }
    }

    /// Advance CURRENT past an orphaned `version` file that was built on
    /// `base_version`, provided CURRENT still names `base_version`.
    async fn roll_forward_orphan(&self, ident: &TableIdent, version: u64, base_version: u64) {
        let orphan = match self.load_commit(ident, version).await {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!(
                    table = %ident,
                    version,
                    error = %e,
                    "existing version file is unreadable; leaving CURRENT as is"
                );
                return;
            }
        };
        if orphan.base_version != base_version {
            return;
        }
        match self.load_current_version(ident).await {
            Ok(Some(current)) if current == base_version => {}
            _ => return,
        }

        match self.write_current(ident, version).await {
            Ok(()) => tracing::warn!(
                table = %ident,
                version,
                base_version,
                "rolled CURRENT forward to an orphaned version"
            ),
            Err(e) => tracing::warn!(
                table = %ident,
                version,
                error = %e,
                "failed to roll CURRENT forward"
            ),
        }
    }

    async fn write_current(&self, ident: &TableIdent, version: u64) -> CatalogResult<()> {
        self.io
            .write(
                &self.current_location(ident),
                Bytes::from(format!("{version}\n")),
            )
            .await
            .context(StorageSnafu)
    }

    /// Table property first, then the catalog-wide default.
    fn property<'a>(&'a self, table: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
        table
            .get(key)
            .or_else(|| self.properties.get(key))
            .map(String::as_str)
    }

    fn delete_after_commit(&self, table: &BTreeMap<String, String>) -> bool {
        self.property(table, METADATA_DELETE_AFTER_COMMIT)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn previous_versions_max(&self, table: &BTreeMap<String, String>) -> usize {
        match self.property(table, METADATA_PREVIOUS_VERSIONS_MAX) {
            None => DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) => n.max(1),
                Err(_) => {
                    tracing::warn!(
                        value = raw,
                        "invalid {METADATA_PREVIOUS_VERSIONS_MAX}; using default"
                    );
                    DEFAULT_METADATA_PREVIOUS_VERSIONS_MAX
                }
            },
        }
    }

    /// Best-effort removal of version files that fell off the metadata log.
    async fn delete_versions(&self, ident: &TableIdent, dropped: &[MetadataLogEntry]) {
        for entry in dropped {
            let location = self.version_location(ident, entry.version);
            if let Err(e) = self.io.delete(&location).await {
                tracing::warn!(
                    table = %ident,
                    location = %location,
                    error = %e,
                    "failed to delete old metadata version"
                );
            }
        }
    }
}

#[async_trait]
impl Catalog for WarehouseCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn table_exists(&self, ident: &TableIdent) -> CatalogResult<bool> {
        ident.validate()?;
        Ok(self.load_current_version(ident).await?.is_some())
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        creation: TableCreation,
    ) -> CatalogResult<Table> {
        ident.validate()?;
        if self.load_current_version(ident).await?.is_some() {
            return TableAlreadyExistsSnafu {
                ident: ident.to_string(),
            }
            .fail();
        }

        let metadata = TableMetadata::new(
            self.table_location(ident),
            creation.schema,
            creation.partition_spec,
            creation.properties,
        );
        let commit = Commit {
            version: 1,
            base_version: 0,
            timestamp: Utc::now(),
            updates: Vec::new(),
            metadata,
        };

        self.write_version(ident, &commit, |_| CatalogError::TableAlreadyExists {
            ident: ident.to_string(),
        })
        .await?;
        self.write_current(ident, commit.version).await?;

        tracing::info!(table = %ident, location = commit.metadata.location(), "created table");
        Ok(Table::new(
            ident.clone(),
            commit.metadata,
            commit.version,
            self.io.clone(),
        ))
    }

    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Table> {
        ident.validate()?;
        let version = self
            .load_current_version(ident)
            .await?
            .context(TableNotFoundSnafu {
                ident: ident.to_string(),
            })?;
        let commit = self.load_commit(ident, version).await?;

        tracing::debug!(table = %ident, version, "loaded table");
        Ok(Table::new(
            ident.clone(),
            commit.metadata,
            version,
            self.io.clone(),
        ))
    }

    /// Commit `updates` as version `base_version + 1`.
    ///
    /// 1. Load CURRENT; a mismatch with `base_version` is a version conflict.
    /// 2. Apply the updates to the base metadata; an update built on a stale
    ///    snapshot is a conflict, any other rejection is an invalid update.
    /// 3. Record the base version in the metadata log.
    /// 4. Create the next version file (create-only; losing is a race, and
    ///    an orphan left on this base by a crashed writer is rolled forward).
    /// 5. Overwrite CURRENT.
    /// 6. If enabled, delete version files that fell off the metadata log.
    async fn update_table(
        &self,
        ident: &TableIdent,
        base_version: u64,
        updates: Vec<TableUpdate>,
    ) -> CatalogResult<Table> {
        ident.validate()?;
        let current = self
            .load_current_version(ident)
            .await?
            .context(TableNotFoundSnafu {
                ident: ident.to_string(),
            })?;
        if current != base_version {
            return VersionConflictSnafu {
                ident: ident.to_string(),
                expected: base_version,
                found: current,
            }
            .fail();
        }

        let base = self.load_commit(ident, base_version).await?;
        let mut metadata = base.metadata;
        let base_entry = MetadataLogEntry {
            version: base_version,
            timestamp_ms: metadata.last_updated_ms(),
        };

        for update in &updates {
            metadata.apply(update).map_err(|source| match source {
                MetadataError::StaleParent { .. } => StaleBaseSnafu {
                    ident: ident.to_string(),
                }
                .into_error(source),
                other => InvalidUpdateSnafu {
                    ident: ident.to_string(),
                }
                .into_error(other),
            })?;
        }

        let delete_after_commit = self.delete_after_commit(metadata.properties());
        let max_entries = if delete_after_commit {
            self.previous_versions_max(metadata.properties())
        } else {
            usize::MAX
        };
        let dropped = metadata.push_metadata_log(base_entry, max_entries);

        let version = base_version
            .checked_add(1)
            .context(CorruptMetadataSnafu {
                location: self.current_location(ident),
                msg: "version counter overflow",
            })?;
        let commit = Commit {
            version,
            base_version,
            timestamp: Utc::now(),
            updates,
            metadata,
        };

        let written = self
            .write_version(ident, &commit, |source| {
                CommitRaceSnafu {
                    ident: ident.to_string(),
                    version,
                }
                .into_error(source)
            })
            .await;
        if let Err(e) = written {
            if matches!(e, CatalogError::CommitRace { .. }) {
                self.roll_forward_orphan(ident, version, base_version).await;
            }
            return Err(e);
        }
        self.write_current(ident, version).await?;

        tracing::info!(
            table = %ident,
            version,
            snapshot_id = ?commit.metadata.current_snapshot().map(|s| s.snapshot_id),
            "committed table update"
        );

        if delete_after_commit {
            self.delete_versions(ident, &dropped).await;
        }

        Ok(Table::new(
            ident.clone(),
            commit.metadata,
            version,
            self.io.clone(),
        ))
    }
}
