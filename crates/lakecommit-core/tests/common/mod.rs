#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::{ArrayRef, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lakecommit_core::{
    catalog::WarehouseCatalog,
    config::{AppConfig, DEFAULT_CATALOG_NAME},
    storage::FileIo,
};
use object_store::path::Path as ObjectPath;
use parquet::arrow::ArrowWriter;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const MEMORY_WAREHOUSE: &str = "memory://bucket/warehouse";

/// Rows used by the generated sample file: 4 rows, one null `name`.
pub const SAMPLE_ROWS: &[(Option<&str>, Option<&str>)] = &[
    (Some("1"), Some("alice")),
    (Some("2"), None),
    (Some("3"), Some("carol")),
    (Some("4"), Some("dave")),
];

fn field_with_id(name: &str, id: i32) -> Field {
    Field::new(name, DataType::Utf8, true).with_metadata(HashMap::from([(
        "PARQUET:field_id".to_string(),
        id.to_string(),
    )]))
}

/// Write a two-column (`id`, `name`) Parquet file and return its bytes.
pub fn write_id_name_parquet(path: &Path, rows: &[(Option<&str>, Option<&str>)]) -> TestResult<Vec<u8>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut ids = StringBuilder::new();
    let mut names = StringBuilder::new();
    for (id, name) in rows {
        ids.append_option(*id);
        names.append_option(*name);
    }

    let schema = Arc::new(Schema::new(vec![
        field_with_id("id", 1),
        field_with_id("name", 2),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ids.finish()) as ArrayRef,
            Arc::new(names.finish()) as ArrayRef,
        ],
    )?;

    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
    }
    std::fs::write(path, &buf)?;
    Ok(buf)
}

/// Directory holding the generated `sample.parquet`.
pub fn sample_asset_dir(root: &Path) -> TestResult<(PathBuf, Vec<u8>)> {
    let dir = root.join("assets");
    let bytes = write_id_name_parquet(&dir.join("sample.parquet"), SAMPLE_ROWS)?;
    Ok((dir, bytes))
}

/// The sample file compiled into the CLI binary.
pub const BUNDLED_SAMPLE: &[u8] = include_bytes!("../../../lakecommit-cli/assets/sample.parquet");

/// A catalog over a fresh in-memory warehouse, built from the same property
/// map the CLI uses.
pub fn memory_catalog() -> TestResult<WarehouseCatalog> {
    let config = AppConfig::new(MEMORY_WAREHOUSE);
    let io = FileIo::for_location(config.warehouse())?;
    Ok(WarehouseCatalog::new(
        DEFAULT_CATALOG_NAME,
        config.warehouse(),
        io,
        config.catalog_properties(),
    ))
}

/// Keys of every object under `prefix` (a key, not a location).
pub async fn list_keys(io: &FileIo, prefix: &str) -> TestResult<Vec<String>> {
    let prefix = ObjectPath::from(prefix);
    let metas: Vec<_> = io.store().list(Some(&prefix)).try_collect().await?;
    let mut keys: Vec<String> = metas.into_iter().map(|m| m.location.to_string()).collect();
    keys.sort();
    Ok(keys)
}
