//! End-to-end runs of the create-or-load / upload / metrics / append
//! pipeline against in-memory and local-filesystem warehouses.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use common::*;
use lakecommit_core::{
    assets::{AssetError, Assets},
    catalog::{Catalog, TableIdent, load_catalog},
    config::{AppConfig, SAMPLE_ASSET},
    metadata::{Datum, FileFormat},
    pipeline::{
        self, AppContext, PipelineError, Progress, TableResolution, default_schema,
        resolve_table,
    },
};
use tempfile::TempDir;

fn context(catalog: Arc<dyn Catalog>, assets: Assets) -> AppContext {
    AppContext::new(catalog, default_schema().expect("schema"), assets)
}

async fn run_collecting(ctx: &AppContext) -> (Result<pipeline::RunReport, PipelineError>, Vec<Progress>) {
    let mut events = Vec::new();
    let result = pipeline::run(ctx, |p| events.push(p)).await;
    (result, events)
}

#[tokio::test]
async fn fresh_table_is_created_then_appended() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, asset_bytes) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(memory_catalog()?);
    let ctx = context(catalog.clone(), Assets::from_dir(asset_dir));

    let (result, events) = run_collecting(&ctx).await;
    let report = result?;

    assert_eq!(
        events,
        vec![
            Progress::Starting,
            Progress::CreatingTable,
            Progress::UploadingFile,
            Progress::AppendingFile,
            Progress::Done,
        ]
    );
    assert_eq!(report.resolution, TableResolution::Created);
    assert_eq!(report.ident, TableIdent::new("default", "athena_test"));
    assert_eq!(report.total_data_files, 1);
    assert_eq!(report.record_count, SAMPLE_ROWS.len() as u64);

    let table = catalog.load_table(ctx.ident()).await?;
    let field_ids: Vec<i32> = table.schema().fields().iter().map(|f| f.id).collect();
    assert_eq!(field_ids, vec![1, 2]);
    assert!(table.metadata().partition_spec().is_unpartitioned());

    let files = table.data_files();
    assert_eq!(files.len(), 1);
    let file = files[0];
    assert_eq!(file.file_path, report.file.location);
    assert_eq!(file.file_format, FileFormat::Parquet);
    assert!(file.partition.is_empty());
    assert!(file.file_path.starts_with(
        "memory://bucket/warehouse/default.db/athena_test/data/"
    ));
    assert!(file.file_path.ends_with(".parquet"));

    // bytes written == bytes read back == size in the descriptor
    let stored = table.io().read(&file.file_path).await?;
    assert_eq!(stored.as_ref(), asset_bytes.as_slice());
    assert_eq!(file.file_size_in_bytes, asset_bytes.len() as u64);
    assert_eq!(report.file.size, asset_bytes.len() as u64);

    assert_eq!(file.record_count, SAMPLE_ROWS.len() as u64);
    let metrics = file.metrics();
    let mut ids: Vec<i32> = metrics.field_ids().collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(metrics.null_value_counts.get(&2), Some(&1));
    assert_eq!(
        metrics.lower_bounds.get(&2),
        Some(&Datum::String("alice".to_string()))
    );
    assert_eq!(
        metrics.upper_bounds.get(&2),
        Some(&Datum::String("dave".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn created_table_starts_without_data_files() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let ctx = context(Arc::new(memory_catalog()?), Assets::from_dir(asset_dir));

    let mut events = Vec::new();
    let (table, resolution) = resolve_table(&ctx, &mut |p| events.push(p)).await?;

    assert_eq!(resolution, TableResolution::Created);
    assert_eq!(events, vec![Progress::CreatingTable]);
    assert_eq!(table.schema(), &default_schema()?);
    assert!(table.data_files().is_empty());
    assert!(table.current_snapshot().is_none());
    Ok(())
}

#[tokio::test]
async fn second_run_loads_table_and_adds_second_file() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(memory_catalog()?);

    let first = context(catalog.clone(), Assets::from_dir(&asset_dir));
    let (result, _) = run_collecting(&first).await;
    let first_report = result?;

    // A fresh context, as a second process would build.
    let second = context(catalog.clone(), Assets::from_dir(&asset_dir));
    let (result, events) = run_collecting(&second).await;
    let second_report = result?;

    assert_eq!(events[1], Progress::LoadingTable);
    assert_eq!(second_report.resolution, TableResolution::Loaded);
    assert_eq!(second_report.total_data_files, 2);
    assert_ne!(first_report.file.location, second_report.file.location);

    let table = catalog.load_table(second.ident()).await?;
    assert_eq!(table.data_files().len(), 2);
    assert_eq!(table.metadata().snapshots().len(), 2);

    let current = table.current_snapshot().expect("current snapshot");
    assert_eq!(current.snapshot_id, second_report.snapshot_id);
    assert_eq!(current.parent_snapshot_id, Some(first_report.snapshot_id));
    Ok(())
}

#[tokio::test]
async fn missing_asset_aborts_before_any_upload() -> TestResult {
    let tmp = TempDir::new()?;
    let empty_assets = tmp.path().join("no-assets");
    std::fs::create_dir_all(&empty_assets)?;
    let catalog = Arc::new(memory_catalog()?);
    let ctx = context(catalog.clone(), Assets::from_dir(empty_assets));

    let (result, events) = run_collecting(&ctx).await;

    let err = result.expect_err("missing asset");
    assert!(matches!(
        err,
        PipelineError::ReadAsset {
            source: AssetError::Missing { .. }
        }
    ));
    assert_eq!(events.last(), Some(&Progress::UploadingFile));
    assert!(!events.contains(&Progress::Done));

    let data_keys = list_keys(
        catalog.io(),
        "warehouse/default.db/athena_test/data",
    )
    .await?;
    assert!(data_keys.is_empty(), "unexpected objects: {data_keys:?}");

    let table = catalog.load_table(ctx.ident()).await?;
    assert!(table.data_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn local_filesystem_warehouse_roundtrip() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, asset_bytes) = sample_asset_dir(tmp.path())?;
    let warehouse_dir = tmp.path().join("warehouse");
    std::fs::create_dir_all(&warehouse_dir)?;
    let config = AppConfig::new(format!("file://{}", warehouse_dir.display()));

    let catalog = load_catalog(&config.catalog_properties())?;
    let ctx = AppContext::new(catalog.clone(), default_schema()?, Assets::from_dir(&asset_dir));
    let (result, _) = run_collecting(&ctx).await;
    result?;

    let table_dir = warehouse_dir.join("default.db").join("athena_test");
    let current = std::fs::read_to_string(table_dir.join("metadata").join("CURRENT"))?;
    assert_eq!(current, "2\n");

    let data: Vec<_> = std::fs::read_dir(table_dir.join("data"))?.collect::<Result<_, _>>()?;
    assert_eq!(data.len(), 1);
    assert_eq!(std::fs::read(data[0].path())?, asset_bytes);

    // Reloading through a second catalog sees the committed file.
    let reloaded = load_catalog(&config.catalog_properties())?;
    let table = reloaded.load_table(ctx.ident()).await?;
    assert_eq!(table.data_files().len(), 1);
    Ok(())
}

#[tokio::test]
async fn metadata_log_tracks_previous_versions() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(memory_catalog()?);

    for _ in 0..3 {
        let ctx = context(catalog.clone(), Assets::from_dir(&asset_dir));
        let (result, _) = run_collecting(&ctx).await;
        result?;
    }

    let ident = TableIdent::new("default", "athena_test");
    let table = catalog.load_table(&ident).await?;
    assert_eq!(table.version(), 4);
    assert_eq!(table.data_files().len(), 3);
    // Default retention keeps every previous version.
    assert_eq!(table.metadata().metadata_log().len(), 3);
    Ok(())
}

#[tokio::test]
async fn bundled_sample_asset_metrics() -> TestResult {
    let catalog = Arc::new(memory_catalog()?);
    let ctx = context(catalog.clone(), Assets::embedded([(SAMPLE_ASSET, BUNDLED_SAMPLE)]));

    let (result, _) = run_collecting(&ctx).await;
    let report = result?;

    assert_eq!(report.record_count, 5);
    let table = catalog.load_table(ctx.ident()).await?;
    let file = table.data_files()[0].clone();
    assert_eq!(file.file_size_in_bytes, BUNDLED_SAMPLE.len() as u64);

    assert_eq!(file.value_counts.get(&1), Some(&5));
    assert_eq!(file.value_counts.get(&2), Some(&5));
    assert_eq!(file.null_value_counts.get(&1), Some(&0));
    assert_eq!(file.null_value_counts.get(&2), Some(&1));
    assert_eq!(file.lower_bounds.get(&1), Some(&Datum::String("1".to_string())));
    assert_eq!(file.upper_bounds.get(&1), Some(&Datum::String("5".to_string())));
    assert_eq!(
        file.lower_bounds.get(&2),
        Some(&Datum::String("alice".to_string()))
    );
    assert_eq!(
        file.upper_bounds.get(&2),
        Some(&Datum::String("erin".to_string()))
    );
    assert_eq!(file.split_offsets, vec![4]);
    Ok(())
}

#[test]
fn missing_warehouse_fails_before_catalog_is_built() {
    let err = AppConfig::from_lookup(|_| None).expect_err("no warehouse");
    assert!(err.to_string().contains("ICEBERG_WAREHOUSE"));
}
