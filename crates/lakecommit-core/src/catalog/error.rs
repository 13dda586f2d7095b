use snafu::{Backtrace, prelude::*};

use crate::{metadata::MetadataError, storage::StorageError};

/// Errors raised by catalog operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CatalogError {
    /// The table has never been created.
    #[snafu(display("Table {ident} does not exist"))]
    TableNotFound {
        /// Qualified table name.
        ident: String,
    },

    /// A table with the same name already exists.
    #[snafu(display("Table {ident} already exists"))]
    TableAlreadyExists {
        /// Qualified table name.
        ident: String,
    },

    /// The caller's base version is no longer the current version.
    #[snafu(display(
        "Commit conflict on {ident}: expected version {expected}, but CURRENT is {found}"
    ))]
    VersionConflict {
        /// Qualified table name.
        ident: String,
        /// Version the caller built its updates on.
        expected: u64,
        /// Version currently recorded in CURRENT.
        found: u64,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Another writer created the next version file first.
    #[snafu(display("Commit conflict on {ident}: version {version} was written concurrently"))]
    CommitRace {
        /// Qualified table name.
        ident: String,
        /// The contested version.
        version: u64,
        /// The create-only write that lost.
        source: StorageError,
    },

    /// The updates were built against a snapshot that is no longer current.
    #[snafu(display("Commit conflict on {ident}: {source}"))]
    StaleBase {
        /// Qualified table name.
        ident: String,
        /// The rejected update.
        source: MetadataError,
    },

    /// An update that can never apply to this table.
    #[snafu(display("Invalid update for {ident}: {source}"))]
    InvalidUpdate {
        /// Qualified table name.
        ident: String,
        /// Why the update was rejected.
        source: MetadataError,
    },

    /// A namespace or table name that cannot be mapped to a location.
    #[snafu(display("Invalid table identifier {ident:?}: {reason}"))]
    InvalidIdentifier {
        /// The rejected identifier.
        ident: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Underlying storage error while reading or writing catalog files.
    #[snafu(display("Storage error while accessing catalog: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// A metadata or CURRENT file is malformed.
    #[snafu(display("Corrupt catalog state at {location}: {msg}"))]
    CorruptMetadata {
        /// The offending object.
        location: String,
        /// A description of the problem.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A required catalog property is missing.
    #[snafu(display("Missing catalog property {property}"))]
    MissingProperty {
        /// Property key.
        property: String,
    },

    /// A `catalog-impl` or `io-impl` value this crate does not provide.
    #[snafu(display("Unsupported {property} {value:?}"))]
    UnsupportedImplementation {
        /// Property key.
        property: String,
        /// The rejected value.
        value: String,
    },
}

impl CatalogError {
    /// True for every kind of optimistic-concurrency conflict: the caller may
    /// reload the table and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CatalogError::VersionConflict { .. }
                | CatalogError::CommitRace { .. }
                | CatalogError::StaleBase { .. }
        )
    }
}
