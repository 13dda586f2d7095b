use std::{error::Error, fmt};

use snafu::{Backtrace, prelude::*};

/// Errors produced by the object store backend.
///
/// Backend-specific failures are wrapped in this enum so higher layers can map
/// them into [`StorageError`] variants with additional context.
#[derive(Debug)]
pub enum BackendError {
    /// An error returned by the `object_store` client.
    ObjectStore(object_store::Error),
    /// A key that the object store path rules reject.
    Path(object_store::path::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ObjectStore(e) => write!(f, "object store error: {e}"),
            BackendError::Path(e) => write!(f, "invalid object key: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::ObjectStore(e) => Some(e),
            BackendError::Path(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified object was not found.
    #[snafu(display("Object not found: {location}"))]
    NotFound {
        /// The location that was not found.
        location: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The object already exists and the write requested create-only semantics.
    #[snafu(display("Object already exists: {location}"))]
    AlreadyExists {
        /// The location that was found to already exist.
        location: String,
        /// Underlying backend error that indicates the existing object.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Any other backend failure (auth, network, quota, ...).
    #[snafu(display("Object store error at {location}: {source}"))]
    Backend {
        /// The location being accessed.
        location: String,
        /// Underlying backend error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A location string that cannot be split into scheme, bucket, and key.
    #[snafu(display("Invalid storage location {location:?}: {reason}"))]
    InvalidLocation {
        /// The offending location string.
        location: String,
        /// Why the location was rejected.
        reason: String,
    },

    /// The location uses a scheme this build cannot open.
    #[snafu(display("Unsupported storage scheme {scheme:?} in {location}"))]
    UnsupportedScheme {
        /// The scheme that was requested.
        scheme: String,
        /// The full location string.
        location: String,
    },

    /// The location points outside the bucket the store is bound to.
    #[snafu(display("Location {location} is outside {scheme}://{bucket}"))]
    ForeignLocation {
        /// The offending location.
        location: String,
        /// Scheme of the bound store.
        scheme: String,
        /// Bucket of the bound store.
        bucket: String,
    },
}

impl StorageError {
    /// Classify an `object_store` error for `location`.
    pub(crate) fn from_object_store(location: &str, err: object_store::Error) -> Self {
        let location = location.to_string();
        match err {
            e @ object_store::Error::NotFound { .. } => StorageError::NotFound {
                location,
                source: BackendError::ObjectStore(e),
                backtrace: Backtrace::capture(),
            },
            e @ (object_store::Error::AlreadyExists { .. }
            | object_store::Error::Precondition { .. }) => StorageError::AlreadyExists {
                location,
                source: BackendError::ObjectStore(e),
                backtrace: Backtrace::capture(),
            },
            e => StorageError::Backend {
                location,
                source: BackendError::ObjectStore(e),
                backtrace: Backtrace::capture(),
            },
        }
    }

    /// True when the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// True when a create-only write found an existing object.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}
