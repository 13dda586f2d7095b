//! Table catalog.
//!
//! A catalog maps `namespace.table` identifiers to table metadata and
//! coordinates metadata updates. The [`Catalog`] trait is the seam the
//! pipeline and the append transaction talk to; [`WarehouseCatalog`] is the
//! shipped implementation, which keeps everything as plain objects under a
//! warehouse root in object storage.
//!
//! Commits are optimistic: callers pass the version their updates were built
//! on, and any concurrent change surfaces as an error for which
//! [`CatalogError::is_conflict`] is true.

mod error;
mod warehouse;

pub use error::CatalogError;
pub(crate) use error::*;
pub use warehouse::{Commit, WarehouseCatalog};

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{
    metadata::{PartitionSpec, Schema, TableUpdate},
    storage::FileIo,
    table::Table,
};

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog property: display name of the catalog.
pub const CATALOG_NAME: &str = "catalog-name";
/// Catalog property: which catalog implementation to build.
pub const CATALOG_IMPL: &str = "catalog-impl";
/// Catalog property: warehouse root location.
pub const WAREHOUSE_LOCATION: &str = "warehouse";
/// Catalog property: which storage I/O implementation to build.
pub const IO_IMPL: &str = "io-impl";

/// The storage-backed catalog implementation name.
pub const WAREHOUSE_CATALOG_IMPL: &str = "warehouse";
/// The `object_store`-backed I/O implementation name.
pub const OBJECT_STORE_IO_IMPL: &str = "object-store";

const DEFAULT_CATALOG_NAME: &str = "lakecommit";

/// Namespace plus table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    namespace: String,
    name: String,
}

impl TableIdent {
    /// Identifier for `namespace.name`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace part.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Table name part.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reject parts that cannot be used as a single path segment.
    pub(crate) fn validate(&self) -> CatalogResult<()> {
        for (what, part) in [("namespace", &self.namespace), ("table name", &self.name)] {
            if part.is_empty() {
                return InvalidIdentifierSnafu {
                    ident: self.to_string(),
                    reason: format!("{what} is empty"),
                }
                .fail();
            }
            if part.contains('/') || part == "." || part == ".." {
                return InvalidIdentifierSnafu {
                    ident: self.to_string(),
                    reason: format!("{what} {part:?} is not a valid path segment"),
                }
                .fail();
            }
        }
        Ok(())
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Everything needed to create a table.
#[derive(Debug, Clone)]
pub struct TableCreation {
    /// Table schema.
    pub schema: Schema,
    /// Partition layout.
    pub partition_spec: PartitionSpec,
    /// Initial table properties.
    pub properties: BTreeMap<String, String>,
}

impl TableCreation {
    /// An unpartitioned table with no extra properties.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            partition_spec: PartitionSpec::unpartitioned(),
            properties: BTreeMap::new(),
        }
    }

    /// Add table properties.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }
}

/// Operations the pipeline needs from a catalog.
#[async_trait]
pub trait Catalog: fmt::Debug + Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Whether `ident` has been created.
    async fn table_exists(&self, ident: &TableIdent) -> CatalogResult<bool>;

    /// Create an empty table. Fails with
    /// [`CatalogError::TableAlreadyExists`] if it exists.
    async fn create_table(
        &self,
        ident: &TableIdent,
        creation: TableCreation,
    ) -> CatalogResult<Table>;

    /// Load the latest committed version of a table.
    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Table>;

    /// Apply `updates` on top of `base_version` and commit the result as the
    /// next version. Returns the table at the new version.
    async fn update_table(
        &self,
        ident: &TableIdent,
        base_version: u64,
        updates: Vec<TableUpdate>,
    ) -> CatalogResult<Table>;
}

/// Build a catalog from its property map.
///
/// `catalog-impl` must be `warehouse` and `io-impl` must be `object-store`
/// (both default to those values when absent); `warehouse` is required.
/// The remaining properties are kept as catalog-wide table defaults.
pub fn load_catalog(properties: &BTreeMap<String, String>) -> CatalogResult<Arc<dyn Catalog>> {
    let catalog_impl = properties
        .get(CATALOG_IMPL)
        .map_or(WAREHOUSE_CATALOG_IMPL, String::as_str);
    if catalog_impl != WAREHOUSE_CATALOG_IMPL {
        return UnsupportedImplementationSnafu {
            property: CATALOG_IMPL,
            value: catalog_impl,
        }
        .fail();
    }

    let io_impl = properties
        .get(IO_IMPL)
        .map_or(OBJECT_STORE_IO_IMPL, String::as_str);
    if io_impl != OBJECT_STORE_IO_IMPL {
        return UnsupportedImplementationSnafu {
            property: IO_IMPL,
            value: io_impl,
        }
        .fail();
    }

    let warehouse = properties
        .get(WAREHOUSE_LOCATION)
        .filter(|w| !w.trim().is_empty())
        .context(MissingPropertySnafu {
            property: WAREHOUSE_LOCATION,
        })?;
    let name = properties
        .get(CATALOG_NAME)
        .map_or(DEFAULT_CATALOG_NAME, String::as_str);

    let io = FileIo::for_location(warehouse).context(StorageSnafu)?;
    tracing::debug!(catalog = name, warehouse = %warehouse, "loaded catalog");

    Ok(Arc::new(WarehouseCatalog::new(
        name,
        warehouse.as_str(),
        io,
        properties.clone(),
    )))
}
