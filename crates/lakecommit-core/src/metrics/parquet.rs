//! Column metrics from a Parquet footer.
//!
//! Only the footer is read: every number comes from row-group and column-chunk
//! metadata, never from the pages themselves.

use std::{cmp::Ordering, collections::BTreeMap};

use bytes::Bytes;
use parquet::{
    basic::Type as PhysicalType,
    file::{
        metadata::{ColumnChunkMetaData, RowGroupMetaData},
        reader::{FileReader, SerializedFileReader},
        statistics::Statistics,
    },
    schema::types::ColumnDescriptor,
};
use snafu::prelude::*;

use crate::{
    metadata::{Datum, Metrics, PrimitiveType, Schema},
    metrics::{
        InvalidParquetSnafu, MetricsConfig, MetricsMode, MetricsResult,
        truncate::{
            truncate_binary_max, truncate_binary_min, truncate_string_max, truncate_string_min,
        },
    },
};

/// Metrics of one Parquet file plus its split offsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetrics {
    /// Record count and per-column statistics keyed by field id.
    pub metrics: Metrics,
    /// Row-group start offsets, ascending.
    pub split_offsets: Vec<i64>,
}

#[derive(Debug, Default)]
struct ColumnAccumulator {
    mode: Option<MetricsMode>,
    field_type: Option<PrimitiveType>,
    column_size: u64,
    value_count: u64,
    null_count: u64,
    lower: Option<Datum>,
    upper: Option<Datum>,
    missing_stats: bool,
    bounds_unusable: bool,
}

/// Compute metrics for the Parquet file in `bytes`.
///
/// Leaf columns are matched to `schema` by Parquet field id, falling back to
/// the top-level column name; columns that match neither are skipped.
/// `config` decides per column whether counts and bounds are kept.
pub fn parquet_file_metrics(
    bytes: Bytes,
    schema: &Schema,
    config: &MetricsConfig,
) -> MetricsResult<FileMetrics> {
    let reader = SerializedFileReader::new(bytes).context(InvalidParquetSnafu)?;
    let meta = reader.metadata();
    let schema_descr = meta.file_metadata().schema_descr();

    let mut record_count: u64 = 0;
    let mut columns: BTreeMap<i32, ColumnAccumulator> = BTreeMap::new();
    let mut split_offsets = Vec::with_capacity(meta.num_row_groups());

    // Resolve leaf columns once; the mapping is identical for every row group.
    let resolved: Vec<Option<(i32, &str)>> = (0..schema_descr.num_columns())
        .map(|i| resolve_field(schema_descr.column(i).as_ref(), schema))
        .collect();

    for rg in meta.row_groups() {
        record_count = record_count.saturating_add(non_negative(rg.num_rows()));
        if let Some(offset) = row_group_offset(rg) {
            split_offsets.push(offset);
        }

        for (idx, chunk) in rg.columns().iter().enumerate() {
            let Some(Some((field_id, name))) = resolved.get(idx) else {
                continue;
            };
            let mode = config.mode_for(name);
            let field_type = schema.field_by_id(*field_id).map(|f| f.field_type);

            let acc = columns.entry(*field_id).or_default();
            acc.mode = Some(mode);
            acc.field_type = field_type;
            acc.column_size = acc
                .column_size
                .saturating_add(non_negative(chunk.compressed_size()));

            if !mode.keeps_counts() {
                continue;
            }
            acc.value_count = acc
                .value_count
                .saturating_add(non_negative(chunk.num_values()));

            accumulate_stats(acc, chunk, mode);
        }
    }
    split_offsets.sort_unstable();

    let mut metrics = Metrics {
        record_count,
        ..Metrics::default()
    };
    for (field_id, acc) in columns {
        finish_column(&mut metrics, field_id, acc);
    }

    tracing::debug!(
        record_count,
        columns = metrics.column_sizes.len(),
        row_groups = split_offsets.len(),
        "computed parquet footer metrics"
    );

    Ok(FileMetrics {
        metrics,
        split_offsets,
    })
}

/// Map a leaf column to a table field: Parquet field id first, then the
/// top-level name.
fn resolve_field<'a>(column: &ColumnDescriptor, schema: &'a Schema) -> Option<(i32, &'a str)> {
    let info = column.self_type().get_basic_info();
    if info.has_id() {
        return schema
            .field_by_id(info.id())
            .map(|f| (f.id, f.name.as_str()));
    }

    match column.path().parts() {
        [name] => schema
            .field_by_name(name)
            .map(|f| (f.id, f.name.as_str())),
        _ => None,
    }
}

fn row_group_offset(rg: &RowGroupMetaData) -> Option<i64> {
    let first = rg.columns().first()?;
    Some(
        first
            .dictionary_page_offset()
            .unwrap_or_else(|| first.data_page_offset()),
    )
}

fn accumulate_stats(acc: &mut ColumnAccumulator, chunk: &ColumnChunkMetaData, mode: MetricsMode) {
    let Some(stats) = chunk.statistics() else {
        acc.missing_stats = true;
        return;
    };
    let Some(nulls) = stats.null_count_opt() else {
        acc.missing_stats = true;
        return;
    };
    acc.null_count = acc.null_count.saturating_add(nulls);

    if !mode.keeps_bounds() || acc.bounds_unusable {
        return;
    }

    // A row group with only nulls carries no min/max; it does not narrow the
    // bounds.
    let (Some(min_bytes), Some(max_bytes)) = (stats.min_bytes_opt(), stats.max_bytes_opt()) else {
        return;
    };
    if is_deprecated_byte_order(stats) {
        acc.bounds_unusable = true;
        return;
    }

    let physical = chunk.column_type();
    let decoded = acc.field_type.and_then(|ft| {
        Some((
            decode_bound(physical, ft, min_bytes)?,
            decode_bound(physical, ft, max_bytes)?,
        ))
    });
    let Some((min, max)) = decoded else {
        tracing::debug!(
            column = chunk.column_path().string(),
            physical = %physical,
            "cannot decode column bounds; dropping them"
        );
        acc.bounds_unusable = true;
        return;
    };

    acc.lower = match acc.lower.take() {
        None => Some(min),
        Some(prev) => match compare(&prev, &min) {
            Some(Ordering::Greater) => Some(min),
            Some(_) => Some(prev),
            None => {
                acc.bounds_unusable = true;
                None
            }
        },
    };
    acc.upper = match acc.upper.take() {
        None => Some(max),
        Some(prev) => match compare(&prev, &max) {
            Some(Ordering::Less) => Some(max),
            Some(_) => Some(prev),
            None => {
                acc.bounds_unusable = true;
                None
            }
        },
    };
}

/// Byte-array min/max written with the legacy signed ordering are not usable
/// as bounds.
fn is_deprecated_byte_order(stats: &Statistics) -> bool {
    matches!(
        stats,
        Statistics::ByteArray(_) | Statistics::FixedLenByteArray(_)
    ) && stats.is_min_max_deprecated()
}

fn finish_column(metrics: &mut Metrics, field_id: i32, acc: ColumnAccumulator) {
    metrics.column_sizes.insert(field_id, acc.column_size);

    let Some(mode) = acc.mode else {
        return;
    };
    if !mode.keeps_counts() {
        return;
    }
    metrics.value_counts.insert(field_id, acc.value_count);

    // Any row group without statistics makes the file-level null count and
    // bounds unknown.
    if acc.missing_stats {
        return;
    }
    metrics.null_value_counts.insert(field_id, acc.null_count);

    if !mode.keeps_bounds() || acc.bounds_unusable {
        return;
    }
    if let Some(lower) = acc.lower.map(|d| truncate_lower(d, mode)) {
        metrics.lower_bounds.insert(field_id, lower);
    }
    if let Some(upper) = acc.upper.and_then(|d| truncate_upper(d, mode)) {
        metrics.upper_bounds.insert(field_id, upper);
    }
}

fn truncate_lower(datum: Datum, mode: MetricsMode) -> Datum {
    match (datum, mode) {
        (Datum::String(s), MetricsMode::Truncate(n)) => Datum::String(truncate_string_min(&s, n)),
        (Datum::Binary(b), MetricsMode::Truncate(n)) => Datum::Binary(truncate_binary_min(&b, n)),
        (other, _) => other,
    }
}

fn truncate_upper(datum: Datum, mode: MetricsMode) -> Option<Datum> {
    match (datum, mode) {
        (Datum::String(s), MetricsMode::Truncate(n)) => {
            truncate_string_max(&s, n).map(Datum::String)
        }
        (Datum::Binary(b), MetricsMode::Truncate(n)) => {
            truncate_binary_max(&b, n).map(Datum::Binary)
        }
        (other, _) => Some(other),
    }
}

/// Decode a plain-encoded statistics value into a bound of the table type.
/// `None` when the physical and table types do not line up, or for a
/// non-finite float.
fn decode_bound(physical: PhysicalType, field_type: PrimitiveType, bytes: &[u8]) -> Option<Datum> {
    match (physical, field_type) {
        (PhysicalType::BOOLEAN, PrimitiveType::Boolean) => {
            bytes.first().map(|b| Datum::Boolean(*b != 0))
        }
        (PhysicalType::INT32, PrimitiveType::Int) => le_i32(bytes).map(Datum::Int),
        (PhysicalType::INT32, PrimitiveType::Long) => {
            le_i32(bytes).map(|v| Datum::Long(i64::from(v)))
        }
        (PhysicalType::INT64, PrimitiveType::Long) => le_i64(bytes).map(Datum::Long),
        (PhysicalType::FLOAT, PrimitiveType::Float) => le_f32(bytes)
            .filter(|v| v.is_finite())
            .map(Datum::Float),
        (PhysicalType::FLOAT, PrimitiveType::Double) => le_f32(bytes)
            .filter(|v| v.is_finite())
            .map(|v| Datum::Double(f64::from(v))),
        (PhysicalType::DOUBLE, PrimitiveType::Double) => le_f64(bytes)
            .filter(|v| v.is_finite())
            .map(Datum::Double),
        (PhysicalType::BYTE_ARRAY, PrimitiveType::String) => std::str::from_utf8(bytes)
            .ok()
            .map(|s| Datum::String(s.to_string())),
        (
            PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY,
            PrimitiveType::Binary,
        ) => Some(Datum::Binary(bytes.to_vec())),
        _ => None,
    }
}

fn le_i32(bytes: &[u8]) -> Option<i32> {
    bytes.try_into().ok().map(i32::from_le_bytes)
}

fn le_i64(bytes: &[u8]) -> Option<i64> {
    bytes.try_into().ok().map(i64::from_le_bytes)
}

fn le_f32(bytes: &[u8]) -> Option<f32> {
    bytes.try_into().ok().map(f32::from_le_bytes)
}

fn le_f64(bytes: &[u8]) -> Option<f64> {
    bytes.try_into().ok().map(f64::from_le_bytes)
}

fn compare(a: &Datum, b: &Datum) -> Option<Ordering> {
    match (a, b) {
        (Datum::Boolean(x), Datum::Boolean(y)) => Some(x.cmp(y)),
        (Datum::Int(x), Datum::Int(y)) => Some(x.cmp(y)),
        (Datum::Long(x), Datum::Long(y)) => Some(x.cmp(y)),
        (Datum::Float(x), Datum::Float(y)) => x.partial_cmp(y),
        (Datum::Double(x), Datum::Double(y)) => x.partial_cmp(y),
        (Datum::String(x), Datum::String(y)) => Some(x.cmp(y)),
        (Datum::Binary(x), Datum::Binary(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
