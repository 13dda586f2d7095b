//! Data-file descriptors registered with a snapshot.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataError, MetadataResult};

/// On-disk file format of a data file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Apache Parquet.
    #[default]
    Parquet,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Parquet => f.write_str("PARQUET"),
        }
    }
}

/// A single typed bound value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Datum {
    /// Boolean bound.
    Boolean(bool),
    /// 32-bit integer bound.
    Int(i32),
    /// 64-bit integer bound.
    Long(i64),
    /// 32-bit float bound.
    Float(f32),
    /// 64-bit float bound.
    Double(f64),
    /// String bound (possibly truncated).
    String(String),
    /// Binary bound (possibly truncated).
    Binary(Vec<u8>),
}

/// Column-level statistics for one data file, keyed by field id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Number of rows in the file.
    pub record_count: u64,
    /// Compressed bytes per column.
    pub column_sizes: BTreeMap<i32, u64>,
    /// Values per column, nulls included.
    pub value_counts: BTreeMap<i32, u64>,
    /// Nulls per column.
    pub null_value_counts: BTreeMap<i32, u64>,
    /// NaNs per floating-point column.
    pub nan_value_counts: BTreeMap<i32, u64>,
    /// Lower bound per column.
    pub lower_bounds: BTreeMap<i32, Datum>,
    /// Upper bound per column.
    pub upper_bounds: BTreeMap<i32, Datum>,
}

impl Metrics {
    /// Every field id mentioned by any per-column map.
    pub fn field_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.column_sizes
            .keys()
            .chain(self.value_counts.keys())
            .chain(self.null_value_counts.keys())
            .chain(self.nan_value_counts.keys())
            .chain(self.lower_bounds.keys())
            .chain(self.upper_bounds.keys())
            .copied()
    }
}

/// Metadata record that makes a physical file part of a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DataFile {
    /// Fully qualified location of the file.
    pub file_path: String,
    /// File format.
    pub file_format: FileFormat,
    /// Partition values; empty for unpartitioned tables.
    #[serde(default)]
    pub partition: BTreeMap<String, String>,
    /// Number of rows in the file.
    pub record_count: u64,
    /// Exact size of the file in bytes.
    pub file_size_in_bytes: u64,
    /// Compressed bytes per column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_sizes: BTreeMap<i32, u64>,
    /// Values per column, nulls included.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_counts: BTreeMap<i32, u64>,
    /// Nulls per column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub null_value_counts: BTreeMap<i32, u64>,
    /// NaNs per floating-point column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nan_value_counts: BTreeMap<i32, u64>,
    /// Lower bound per column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lower_bounds: BTreeMap<i32, Datum>,
    /// Upper bound per column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upper_bounds: BTreeMap<i32, Datum>,
    /// Offsets where readers may split the file (row-group starts).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_offsets: Vec<i64>,
}

impl DataFile {
    /// Start building a data file.
    pub fn builder() -> DataFileBuilder {
        DataFileBuilder::default()
    }

    /// Metrics view of this file.
    pub fn metrics(&self) -> Metrics {
        Metrics {
            record_count: self.record_count,
            column_sizes: self.column_sizes.clone(),
            value_counts: self.value_counts.clone(),
            null_value_counts: self.null_value_counts.clone(),
            nan_value_counts: self.nan_value_counts.clone(),
            lower_bounds: self.lower_bounds.clone(),
            upper_bounds: self.upper_bounds.clone(),
        }
    }
}

/// Builder for [`DataFile`]. Path, size, and format are mandatory.
#[derive(Debug, Clone, Default)]
pub struct DataFileBuilder {
    file_path: Option<String>,
    file_format: Option<FileFormat>,
    file_size_in_bytes: Option<u64>,
    partition: BTreeMap<String, String>,
    metrics: Metrics,
    split_offsets: Vec<i64>,
}

impl DataFileBuilder {
    /// Fully qualified location.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Exact size in bytes.
    pub fn with_file_size_in_bytes(mut self, size: u64) -> Self {
        self.file_size_in_bytes = Some(size);
        self
    }

    /// File format.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.file_format = Some(format);
        self
    }

    /// Partition values; left empty for unpartitioned tables.
    pub fn with_partition(mut self, partition: BTreeMap<String, String>) -> Self {
        self.partition = partition;
        self
    }

    /// Record count and per-column statistics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Split offsets.
    pub fn with_split_offsets(mut self, offsets: Vec<i64>) -> Self {
        self.split_offsets = offsets;
        self
    }

    /// Build the descriptor.
    pub fn build(self) -> MetadataResult<DataFile> {
        let file_path = self
            .file_path
            .ok_or(MetadataError::MissingDataFileField { field: "file_path" })?;
        let file_format = self.file_format.ok_or(MetadataError::MissingDataFileField {
            field: "file_format",
        })?;
        let file_size_in_bytes =
            self.file_size_in_bytes
                .ok_or(MetadataError::MissingDataFileField {
                    field: "file_size_in_bytes",
                })?;

        let Metrics {
            record_count,
            column_sizes,
            value_counts,
            null_value_counts,
            nan_value_counts,
            lower_bounds,
            upper_bounds,
        } = self.metrics;

        Ok(DataFile {
            file_path,
            file_format,
            partition: self.partition,
            record_count,
            file_size_in_bytes,
            column_sizes,
            value_counts,
            null_value_counts,
            nan_value_counts,
            lower_bounds,
            upper_bounds,
            split_offsets: self.split_offsets,
        })
    }
}
