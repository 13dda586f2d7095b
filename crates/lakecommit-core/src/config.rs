//! Process configuration.
//!
//! The only required input is the warehouse root, read from
//! `ICEBERG_WAREHOUSE`. Everything else is fixed.

use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::{
    catalog::{
        CATALOG_IMPL, CATALOG_NAME, IO_IMPL, OBJECT_STORE_IO_IMPL, WAREHOUSE_CATALOG_IMPL,
        WAREHOUSE_LOCATION,
    },
    table::METADATA_DELETE_AFTER_COMMIT,
};

/// Environment variable holding the warehouse root location.
pub const WAREHOUSE_ENV: &str = "ICEBERG_WAREHOUSE";
/// Namespace the demo table lives in.
pub const DEFAULT_NAMESPACE: &str = "default";
/// Name of the demo table.
pub const DEFAULT_TABLE: &str = "athena_test";
/// Name of the bundled data file.
pub const SAMPLE_ASSET: &str = "sample.parquet";
/// Catalog name reported by the demo catalog.
pub const DEFAULT_CATALOG_NAME: &str = "iceberg";

/// Errors raised while loading configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The warehouse variable is unset or blank.
    #[snafu(display("Need warehouse path: set {variable}"))]
    MissingWarehouse {
        /// The variable that was looked up.
        variable: String,
    },
}

/// Configuration loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    warehouse: String,
}

impl AppConfig {
    /// Configuration for an explicit warehouse root.
    pub fn new(warehouse: impl Into<String>) -> Self {
        Self {
            warehouse: warehouse.into(),
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to
    /// values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let warehouse = lookup(WAREHOUSE_ENV)
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .context(MissingWarehouseSnafu {
                variable: WAREHOUSE_ENV,
            })?;
        Ok(Self { warehouse })
    }

    /// Warehouse root location.
    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    /// Properties used to build the catalog.
    pub fn catalog_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CATALOG_NAME.to_string(), DEFAULT_CATALOG_NAME.to_string()),
            (CATALOG_IMPL.to_string(), WAREHOUSE_CATALOG_IMPL.to_string()),
            (WAREHOUSE_LOCATION.to_string(), self.warehouse.clone()),
            (IO_IMPL.to_string(), OBJECT_STORE_IO_IMPL.to_string()),
            (METADATA_DELETE_AFTER_COMMIT.to_string(), "true".to_string()),
        ])
    }
}
