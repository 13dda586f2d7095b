//! Snapshots: immutable versions of a table's data-file set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metadata::DataFile;

/// Summary key: data files added by the snapshot.
pub const ADDED_DATA_FILES: &str = "added-data-files";
/// Summary key: rows added by the snapshot.
pub const ADDED_RECORDS: &str = "added-records";
/// Summary key: bytes added by the snapshot.
pub const ADDED_FILES_SIZE: &str = "added-files-size";
/// Summary key: live data files after the snapshot.
pub const TOTAL_DATA_FILES: &str = "total-data-files";
/// Summary key: live rows after the snapshot.
pub const TOTAL_RECORDS: &str = "total-records";
/// Summary key: live bytes after the snapshot.
pub const TOTAL_FILES_SIZE: &str = "total-files-size";

/// Kind of change a snapshot represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Only new data files were added.
    Append,
}

/// One immutable version of the table's contents.
///
/// The live file set of a snapshot is its own `added_data_files` plus those of
/// every ancestor reachable through `parent_snapshot_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    /// Unique, positive snapshot id.
    pub snapshot_id: i64,
    /// Snapshot this one was built on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    /// Monotonic sequence number assigned at commit.
    pub sequence_number: i64,
    /// Commit time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// What the snapshot did.
    pub operation: Operation,
    /// Counters describing the change (`added-records`, `total-data-files`, ...).
    #[serde(default)]
    pub summary: BTreeMap<String, String>,
    /// Schema the snapshot was written with.
    pub schema_id: i32,
    /// Data files introduced by this snapshot.
    #[serde(default)]
    pub added_data_files: Vec<DataFile>,
}

impl Snapshot {
    /// Read an integer counter from the summary.
    pub fn summary_u64(&self, key: &str) -> Option<u64> {
        self.summary.get(key).and_then(|v| v.parse().ok())
    }
}
