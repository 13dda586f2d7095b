//! Table-level metadata and the updates that evolve it.
//!
//! A [`TableMetadata`] value is the full state of a table at one version. The
//! catalog never edits it in place: a commit takes the base version's
//! metadata, applies an ordered list of [`TableUpdate`]s, and writes the
//! result as the next version.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::{
    DataFile, MetadataError, MetadataResult, PartitionSpec, Schema, Snapshot,
};

/// Current table metadata format version.
pub const TABLE_FORMAT_VERSION: u8 = 2;

/// One previous metadata version kept for auditing and cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLogEntry {
    /// Version number of the previous metadata file.
    pub version: u64,
    /// When that version was written, in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// An action recorded in a commit.
///
/// Each commit contains a sequence of updates applied in order to the base
/// version's metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum TableUpdate {
    /// Add a snapshot and make it current.
    AddSnapshot {
        /// The new snapshot; its parent must be the current snapshot.
        snapshot: Snapshot,
    },

    /// Set (insert or overwrite) table properties.
    SetProperties {
        /// Properties to set.
        updates: BTreeMap<String, String>,
    },
}

/// Full state of a table at one version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub(crate) format_version: u8,
    pub(crate) table_uuid: Uuid,
    pub(crate) location: String,
    pub(crate) last_sequence_number: i64,
    pub(crate) last_updated_ms: i64,
    pub(crate) last_column_id: i32,
    pub(crate) schema: Schema,
    pub(crate) partition_spec: PartitionSpec,
    #[serde(default)]
    pub(crate) properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) current_snapshot_id: Option<i64>,
    #[serde(default)]
    pub(crate) snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub(crate) metadata_log: Vec<MetadataLogEntry>,
}

impl TableMetadata {
    /// Metadata for a freshly created, empty table.
    pub fn new(
        location: impl Into<String>,
        schema: Schema,
        partition_spec: PartitionSpec,
        properties: BTreeMap<String, String>,
    ) -> Self {
        TableMetadata {
            format_version: TABLE_FORMAT_VERSION,
            table_uuid: Uuid::new_v4(),
            location: location.into(),
            last_sequence_number: 0,
            last_updated_ms: Utc::now().timestamp_millis(),
            last_column_id: schema.highest_field_id(),
            schema,
            partition_spec,
            properties,
            current_snapshot_id: None,
            snapshots: Vec::new(),
            metadata_log: Vec::new(),
        }
    }

    /// Metadata format version.
    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    /// Unique id assigned at creation.
    pub fn table_uuid(&self) -> Uuid {
        self.table_uuid
    }

    /// Base location of the table.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Highest sequence number assigned so far.
    pub fn last_sequence_number(&self) -> i64 {
        self.last_sequence_number
    }

    /// Last modification time in milliseconds since the Unix epoch.
    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    /// Highest field id ever assigned.
    pub fn last_column_id(&self) -> i32 {
        self.last_column_id
    }

    /// Current schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Partition layout.
    pub fn partition_spec(&self) -> &PartitionSpec {
        &self.partition_spec
    }

    /// Table properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Previous versions still tracked.
    pub fn metadata_log(&self) -> &[MetadataLogEntry] {
        &self.metadata_log
    }

    /// All snapshots in commit order.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Look up a snapshot by id.
    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }

    /// The current snapshot, `None` for a table without data.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id
            .and_then(|id| self.snapshot_by_id(id))
    }

    /// The current snapshot followed by its ancestors, newest first.
    pub fn ancestors(&self) -> Vec<&Snapshot> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.current_snapshot();

        while let Some(snapshot) = next {
            if !seen.insert(snapshot.snapshot_id) {
                break;
            }
            out.push(snapshot);
            next = snapshot
                .parent_snapshot_id
                .and_then(|id| self.snapshot_by_id(id));
        }
        out
    }

    /// Live data files of the current snapshot, oldest commit first.
    pub fn data_files(&self) -> Vec<&DataFile> {
        self.ancestors()
            .into_iter()
            .rev()
            .flat_map(|s| s.added_data_files.iter())
            .collect()
    }

    /// Apply one update in place.
    ///
    /// `AddSnapshot` fails with [`MetadataError::StaleParent`] when the
    /// snapshot was built on something other than the current snapshot; the
    /// catalog treats that as a commit conflict.
    pub fn apply(&mut self, update: &TableUpdate) -> MetadataResult<()> {
        match update {
            TableUpdate::AddSnapshot { snapshot } => {
                if snapshot.parent_snapshot_id != self.current_snapshot_id {
                    return Err(MetadataError::StaleParent {
                        expected: self.current_snapshot_id,
                        found: snapshot.parent_snapshot_id,
                    });
                }
                if self.snapshot_by_id(snapshot.snapshot_id).is_some() {
                    return Err(MetadataError::DuplicateSnapshotId {
                        snapshot_id: snapshot.snapshot_id,
                    });
                }
                if snapshot.sequence_number <= self.last_sequence_number {
                    return Err(MetadataError::InvalidUpdate {
                        msg: format!(
                            "sequence number {} is not after last sequence number {}",
                            snapshot.sequence_number, self.last_sequence_number
                        ),
                    });
                }

                self.last_sequence_number = snapshot.sequence_number;
                self.last_updated_ms = snapshot.timestamp_ms;
                self.current_snapshot_id = Some(snapshot.snapshot_id);
                self.snapshots.push(snapshot.clone());
            }
            TableUpdate::SetProperties { updates } => {
                self.properties
                    .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.last_updated_ms = Utc::now().timestamp_millis();
            }
        }
        Ok(())
    }

    /// Record `version` as a previous metadata version, keeping at most
    /// `max_entries`. Returns the entries that fell off the log.
    pub(crate) fn push_metadata_log(
        &mut self,
        entry: MetadataLogEntry,
        max_entries: usize,
    ) -> Vec<MetadataLogEntry> {
        self.metadata_log.push(entry);
        let excess = self.metadata_log.len().saturating_sub(max_entries);
        self.metadata_log.drain(..excess).collect()
    }
}
