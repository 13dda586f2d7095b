//! Append transaction with an explicit commit retry boundary.
//!
//! [`FastAppend`] collects data files, validates them against the table, and
//! commits a single `append` snapshot through a [`Catalog`]. Optimistic
//! concurrency conflicts are the only errors retried: the table is reloaded,
//! the snapshot rebuilt on the new base, and the commit resubmitted after an
//! exponential backoff bounded by [`CommitRetryPolicy`]. Every other error is
//! returned immediately.

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use chrono::Utc;
use snafu::prelude::*;
use uuid::Uuid;

use crate::{
    catalog::{Catalog, CatalogError},
    metadata::{
        ADDED_DATA_FILES, ADDED_FILES_SIZE, ADDED_RECORDS, DataFile, Operation, Snapshot,
        TOTAL_DATA_FILES, TOTAL_FILES_SIZE, TOTAL_RECORDS, TableUpdate,
    },
    table::Table,
};

/// Table property: how many times a conflicting commit is retried.
pub const COMMIT_NUM_RETRIES: &str = "commit.retry.num-retries";
/// Table property: first backoff, in milliseconds.
pub const COMMIT_MIN_RETRY_WAIT_MS: &str = "commit.retry.min-wait-ms";
/// Table property: backoff ceiling, in milliseconds.
pub const COMMIT_MAX_RETRY_WAIT_MS: &str = "commit.retry.max-wait-ms";
/// Table property: overall retry budget, in milliseconds.
pub const COMMIT_TOTAL_RETRY_TIME_MS: &str = "commit.retry.total-timeout-ms";

/// Default for [`COMMIT_NUM_RETRIES`].
pub const DEFAULT_COMMIT_NUM_RETRIES: u32 = 4;
/// Default for [`COMMIT_MIN_RETRY_WAIT_MS`].
pub const DEFAULT_COMMIT_MIN_RETRY_WAIT_MS: u64 = 100;
/// Default for [`COMMIT_MAX_RETRY_WAIT_MS`].
pub const DEFAULT_COMMIT_MAX_RETRY_WAIT_MS: u64 = 60_000;
/// Default for [`COMMIT_TOTAL_RETRY_TIME_MS`].
pub const DEFAULT_COMMIT_TOTAL_RETRY_TIME_MS: u64 = 1_800_000;

/// Convenience alias for append results.
pub type AppendResult<T> = Result<T, AppendError>;

/// Errors raised while validating or committing an append.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppendError {
    /// `commit` was called without any files.
    #[snafu(display("Append contains no data files"))]
    NoFiles,

    /// The same path was added twice, or is already part of the table.
    #[snafu(display("Data file {path} is already part of the append or the table"))]
    DuplicateFile {
        /// The repeated path.
        path: String,
    },

    /// Partition values do not fit the table's partition layout.
    #[snafu(display("Data file {path} has partition values but the table is unpartitioned"))]
    PartitionMismatch {
        /// The offending file.
        path: String,
    },

    /// Metrics refer to a column the table schema does not have.
    #[snafu(display("Data file {path} has metrics for unknown field id {field_id}"))]
    UnknownField {
        /// The offending file.
        path: String,
        /// The unknown field id.
        field_id: i32,
    },

    /// Metrics contradict each other or the record count.
    #[snafu(display("Data file {path} has inconsistent metrics: {msg}"))]
    InconsistentMetrics {
        /// The offending file.
        path: String,
        /// What does not add up.
        msg: String,
    },

    /// A retry property that is not a non-negative integer.
    #[snafu(display("Invalid value {value:?} for table property {property}"))]
    InvalidProperty {
        /// Property key.
        property: String,
        /// The rejected value.
        value: String,
    },

    /// The catalog rejected the commit with a non-retryable error.
    #[snafu(display("Failed to commit append: {source}"))]
    Commit {
        /// Underlying catalog error.
        source: CatalogError,
    },

    /// Reloading the table after a conflict failed.
    #[snafu(display("Failed to reload table after commit conflict: {source}"))]
    Reload {
        /// Underlying catalog error.
        source: CatalogError,
    },

    /// Every attempt ended in a conflict.
    #[snafu(display("Append still conflicting after {attempts} attempts: {source}"))]
    RetriesExhausted {
        /// How many commits were attempted.
        attempts: u32,
        /// The last conflict.
        source: CatalogError,
    },
}

/// Backoff and budget for retrying conflicting commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRetryPolicy {
    /// Retries after the first attempt.
    pub num_retries: u32,
    /// Wait before the first retry.
    pub min_wait: Duration,
    /// Ceiling for any single wait.
    pub max_wait: Duration,
    /// Total time after which no further retry starts.
    pub total_timeout: Duration,
}

impl Default for CommitRetryPolicy {
    fn default() -> Self {
        Self {
            num_retries: DEFAULT_COMMIT_NUM_RETRIES,
            min_wait: Duration::from_millis(DEFAULT_COMMIT_MIN_RETRY_WAIT_MS),
            max_wait: Duration::from_millis(DEFAULT_COMMIT_MAX_RETRY_WAIT_MS),
            total_timeout: Duration::from_millis(DEFAULT_COMMIT_TOTAL_RETRY_TIME_MS),
        }
    }
}

impl CommitRetryPolicy {
    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            num_retries: 0,
            ..Self::default()
        }
    }

    /// Read the policy from table properties, defaulting missing keys.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> AppendResult<Self> {
        fn read<T: std::str::FromStr>(
            properties: &BTreeMap<String, String>,
            key: &str,
            default: T,
        ) -> AppendResult<T> {
            match properties.get(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse().map_err(|_| AppendError::InvalidProperty {
                    property: key.to_string(),
                    value: raw.clone(),
                }),
            }
        }

        let min_wait = read(properties, COMMIT_MIN_RETRY_WAIT_MS, DEFAULT_COMMIT_MIN_RETRY_WAIT_MS)?;
        let max_wait = read(properties, COMMIT_MAX_RETRY_WAIT_MS, DEFAULT_COMMIT_MAX_RETRY_WAIT_MS)?;
        Ok(Self {
            num_retries: read(properties, COMMIT_NUM_RETRIES, DEFAULT_COMMIT_NUM_RETRIES)?,
            min_wait: Duration::from_millis(min_wait),
            max_wait: Duration::from_millis(max_wait.max(min_wait)),
            total_timeout: Duration::from_millis(read(
                properties,
                COMMIT_TOTAL_RETRY_TIME_MS,
                DEFAULT_COMMIT_TOTAL_RETRY_TIME_MS,
            )?),
        })
    }

    /// Wait before retry number `retry` (1-based): `min_wait * 2^(retry-1)`,
    /// capped at `max_wait`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }
}

/// Append of new data files, producing one `append` snapshot.
#[derive(Debug, Clone)]
pub struct FastAppend {
    table: Table,
    files: Vec<DataFile>,
    retry_policy: Option<CommitRetryPolicy>,
}

impl FastAppend {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            files: Vec::new(),
            retry_policy: None,
        }
    }

    /// Add a data file to the append.
    pub fn append_file(mut self, file: DataFile) -> Self {
        self.files.push(file);
        self
    }

    /// Override the retry policy read from table properties.
    pub fn with_retry_policy(mut self, policy: CommitRetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Files added so far.
    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    /// Validate and commit. Returns the table at the committed version.
    pub async fn commit(self, catalog: &dyn Catalog) -> AppendResult<Table> {
        let policy = match self.retry_policy {
            Some(p) => p,
            None => CommitRetryPolicy::from_properties(self.table.properties())?,
        };
        let files = self.files;
        let mut table = self.table;
        validate_files(&table, &files)?;

        let started = tokio::time::Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let snapshot = build_snapshot(&table, &files);
            let snapshot_id = snapshot.snapshot_id;

            let result = catalog
                .update_table(
                    table.ident(),
                    table.version(),
                    vec![TableUpdate::AddSnapshot { snapshot }],
                )
                .await;

            let conflict = match result {
                Ok(committed) => {
                    tracing::info!(
                        table = %committed.ident(),
                        version = committed.version(),
                        snapshot_id,
                        files = files.len(),
                        attempts,
                        "appended data files"
                    );
                    return Ok(committed);
                }
                Err(e) if e.is_conflict() => e,
                Err(source) => return Err(AppendError::Commit { source }),
            };

            let retry = attempts;
            let wait = policy.backoff(retry);
            if retry > policy.num_retries || started.elapsed() + wait > policy.total_timeout {
                return Err(AppendError::RetriesExhausted {
                    attempts,
                    source: conflict,
                });
            }

            tracing::warn!(
                table = %table.ident(),
                attempt = attempts,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %conflict,
                "commit conflict; retrying"
            );
            tokio::time::sleep(wait).await;

            table = catalog
                .load_table(table.ident())
                .await
                .context(ReloadSnafu)?;
            validate_files(&table, &files)?;
        }
    }
}

/// Check each file against the table: unique path, partition layout, and
/// metrics that only name schema fields and agree with the record count.
fn validate_files(table: &Table, files: &[DataFile]) -> AppendResult<()> {
    ensure!(!files.is_empty(), NoFilesSnafu);

    let existing: HashSet<&str> = table
        .data_files()
        .into_iter()
        .map(|f| f.file_path.as_str())
        .collect();
    let mut seen = HashSet::new();
    let unpartitioned = table.metadata().partition_spec().is_unpartitioned();
    let schema = table.schema();

    for file in files {
        let path = file.file_path.as_str();
        ensure!(
            !existing.contains(path) && seen.insert(path),
            DuplicateFileSnafu { path }
        );
        ensure!(
            !unpartitioned || file.partition.is_empty(),
            PartitionMismatchSnafu { path }
        );

        let metrics = file.metrics();
        for field_id in metrics.field_ids() {
            ensure!(
                schema.field_by_id(field_id).is_some(),
                UnknownFieldSnafu { path, field_id }
            );
        }

        for (field_id, values) in &metrics.value_counts {
            ensure!(
                *values <= file.record_count,
                InconsistentMetricsSnafu {
                    path,
                    msg: format!(
                        "field {field_id} has {values} values but the file has {} records",
                        file.record_count
                    ),
                }
            );
        }
        for (field_id, nulls) in &metrics.null_value_counts {
            if let Some(values) = metrics.value_counts.get(field_id) {
                ensure!(
                    nulls <= values,
                    InconsistentMetricsSnafu {
                        path,
                        msg: format!("field {field_id} has {nulls} nulls but {values} values"),
                    }
                );
            }
        }
    }
    Ok(())
}

fn build_snapshot(table: &Table, files: &[DataFile]) -> Snapshot {
    let metadata = table.metadata();
    let parent = metadata.current_snapshot();

    let added_records: u64 = files.iter().map(|f| f.record_count).sum();
    let added_size: u64 = files.iter().map(|f| f.file_size_in_bytes).sum();
    let live = table.data_files();
    let total_records: u64 = live.iter().map(|f| f.record_count).sum::<u64>() + added_records;
    let total_size: u64 = live.iter().map(|f| f.file_size_in_bytes).sum::<u64>() + added_size;

    let summary = BTreeMap::from([
        (ADDED_DATA_FILES.to_string(), files.len().to_string()),
        (ADDED_RECORDS.to_string(), added_records.to_string()),
        (ADDED_FILES_SIZE.to_string(), added_size.to_string()),
        (
            TOTAL_DATA_FILES.to_string(),
            (live.len() + files.len()).to_string(),
        ),
        (TOTAL_RECORDS.to_string(), total_records.to_string()),
        (TOTAL_FILES_SIZE.to_string(), total_size.to_string()),
    ]);

    Snapshot {
        snapshot_id: new_snapshot_id(table),
        parent_snapshot_id: parent.map(|s| s.snapshot_id),
        sequence_number: metadata.last_sequence_number() + 1,
        timestamp_ms: Utc::now().timestamp_millis(),
        operation: Operation::Append,
        summary,
        schema_id: metadata.schema().schema_id(),
        added_data_files: files.to_vec(),
    }
}

/// Random positive id not yet used by the table.
fn new_snapshot_id(table: &Table) -> i64 {
    loop {
        let (hi, lo) = Uuid::new_v4().as_u64_pair();
        let id = ((hi ^ lo) & (i64::MAX as u64)) as i64;
        if id != 0 && table.metadata().snapshot_by_id(id).is_none() {
            return id;
        }
    }
}
