//! The commit retry boundary, exercised through catalogs that inject
//! concurrent writers or hard failures.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use common::*;
use lakecommit_core::{
    assets::Assets,
    catalog::{
        Catalog, CatalogError, CatalogResult, Commit, TableCreation, TableIdent, WarehouseCatalog,
    },
    metadata::TableUpdate,
    pipeline::{self, AppContext, PipelineError, default_schema},
    table::Table,
    transaction::{
        AppendError, COMMIT_MAX_RETRY_WAIT_MS, COMMIT_MIN_RETRY_WAIT_MS, COMMIT_NUM_RETRIES,
    },
};
use tempfile::TempDir;

/// Wraps a real catalog; before forwarding each of the first `conflicts`
/// updates it commits a competing update, so the forwarded one conflicts.
#[derive(Debug)]
struct ConcurrentWriterCatalog {
    inner: WarehouseCatalog,
    conflicts: AtomicU32,
    update_calls: AtomicU32,
}

impl ConcurrentWriterCatalog {
    fn new(inner: WarehouseCatalog, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            update_calls: AtomicU32::new(0),
        }
    }

    fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for ConcurrentWriterCatalog {
    fn name(&self) -> &str {
        "concurrent-writer"
    }

    async fn table_exists(&self, ident: &TableIdent) -> CatalogResult<bool> {
        self.inner.table_exists(ident).await
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        creation: TableCreation,
    ) -> CatalogResult<Table> {
        self.inner.create_table(ident, creation).await
    }

    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Table> {
        self.inner.load_table(ident).await
    }

    async fn update_table(
        &self,
        ident: &TableIdent,
        base_version: u64,
        updates: Vec<TableUpdate>,
    ) -> CatalogResult<Table> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let inject = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if inject {
            let current = self.inner.load_table(ident).await?;
            self.inner
                .update_table(
                    ident,
                    current.version(),
                    vec![TableUpdate::SetProperties {
                        updates: BTreeMap::from([(
                            "other-writer".to_string(),
                            call.to_string(),
                        )]),
                    }],
                )
                .await?;
        }

        self.inner.update_table(ident, base_version, updates).await
    }
}

/// Fails every update with an error that is not a conflict.
#[derive(Debug)]
struct BrokenCatalog {
    inner: WarehouseCatalog,
    update_calls: AtomicU32,
}

#[async_trait]
impl Catalog for BrokenCatalog {
    fn name(&self) -> &str {
        "broken"
    }

    async fn table_exists(&self, ident: &TableIdent) -> CatalogResult<bool> {
        self.inner.table_exists(ident).await
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        creation: TableCreation,
    ) -> CatalogResult<Table> {
        self.inner.create_table(ident, creation).await
    }

    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Table> {
        self.inner.load_table(ident).await
    }

    async fn update_table(
        &self,
        ident: &TableIdent,
        _base_version: u64,
        _updates: Vec<TableUpdate>,
    ) -> CatalogResult<Table> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Err(CatalogError::TableNotFound {
            ident: ident.to_string(),
        })
    }
}

fn fast_retry_properties(retries: u32) -> BTreeMap<String, String> {
    BTreeMap::from([
        (COMMIT_NUM_RETRIES.to_string(), retries.to_string()),
        (COMMIT_MIN_RETRY_WAIT_MS.to_string(), "1".to_string()),
        (COMMIT_MAX_RETRY_WAIT_MS.to_string(), "5".to_string()),
    ])
}

async fn create_table_with(catalog: &dyn Catalog, properties: BTreeMap<String, String>) -> TestResult {
    catalog
        .create_table(
            &TableIdent::new("default", "athena_test"),
            TableCreation::new(default_schema()?).with_properties(properties),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn single_conflict_is_retried_transparently() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(ConcurrentWriterCatalog::new(memory_catalog()?, 1));
    create_table_with(catalog.as_ref(), fast_retry_properties(3)).await?;

    let ctx = AppContext::new(catalog.clone(), default_schema()?, Assets::from_dir(asset_dir));
    let report = pipeline::run(&ctx, |_| {}).await?;

    assert_eq!(catalog.update_calls(), 2);
    assert_eq!(report.total_data_files, 1);

    let table = catalog.load_table(ctx.ident()).await?;
    // create + competing writer + our append
    assert_eq!(table.version(), 3);
    assert_eq!(
        table.properties().get("other-writer").map(String::as_str),
        Some("1")
    );
    assert_eq!(table.data_files().len(), 1);
    Ok(())
}

#[tokio::test]
async fn persistent_conflicts_exhaust_retries() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(ConcurrentWriterCatalog::new(memory_catalog()?, u32::MAX));
    create_table_with(catalog.as_ref(), fast_retry_properties(2)).await?;

    let ctx = AppContext::new(catalog.clone(), default_schema()?, Assets::from_dir(asset_dir));
    let err = pipeline::run(&ctx, |_| {}).await.expect_err("always conflicting");

    match err {
        PipelineError::Append {
            source: AppendError::RetriesExhausted { attempts, source },
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_conflict());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(catalog.update_calls(), 3);

    let table = catalog.load_table(ctx.ident()).await?;
    assert!(table.data_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn non_conflict_errors_are_not_retried() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(BrokenCatalog {
        inner: memory_catalog()?,
        update_calls: AtomicU32::new(0),
    });
    create_table_with(catalog.as_ref(), fast_retry_properties(5)).await?;

    let ctx = AppContext::new(catalog.clone(), default_schema()?, Assets::from_dir(asset_dir));
    let err = pipeline::run(&ctx, |_| {}).await.expect_err("broken catalog");

    assert!(matches!(
        err,
        PipelineError::Append {
            source: AppendError::Commit { .. },
            ..
        }
    ));
    assert_eq!(catalog.update_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn orphaned_version_from_crashed_writer_is_recovered() -> TestResult {
    let tmp = TempDir::new()?;
    let (asset_dir, _) = sample_asset_dir(tmp.path())?;
    let catalog = Arc::new(memory_catalog()?);
    create_table_with(catalog.as_ref(), fast_retry_properties(3)).await?;

    // Version 2 was created by a writer that died before moving CURRENT.
    let ident = TableIdent::new("default", "athena_test");
    let base = catalog.load_commit(&ident, 1).await?;
    let orphan = Commit {
        version: 2,
        base_version: 1,
        timestamp: base.timestamp,
        updates: Vec::new(),
        metadata: base.metadata,
    };
    catalog
        .io()
        .write_new(
            &catalog.version_location(&ident, 2),
            Bytes::from(serde_json::to_vec(&orphan)?),
        )
        .await?;

    let ctx = AppContext::new(catalog.clone(), default_schema()?, Assets::from_dir(asset_dir));
    let report = pipeline::run(&ctx, |_| {}).await?;
    assert_eq!(report.total_data_files, 1);

    let table = catalog.load_table(&ident).await?;
    assert_eq!(table.version(), 3);
    assert_eq!(table.data_files().len(), 1);
    Ok(())
}
