//! Object storage I/O.
//!
//! This module maps fully qualified locations (`s3://bucket/key`,
//! `file:///abs/path`, `memory://bucket/key`) onto an `object_store` backend
//! and exposes the handful of operations the catalog, the uploader, and the
//! metrics reader need:
//!
//! - single-shot puts (`write`) and create-only puts (`write_new`) used as the
//!   optimistic concurrency guard for metadata commits,
//! - whole-object reads (`read`), existence and size checks, and deletes.
//!
//! A [`FileIo`] is bound to one scheme and bucket, derived from the warehouse
//! root. Locations outside that bucket are rejected rather than silently
//! written to the wrong place.

mod error;
mod location;

pub use error::{BackendError, StorageError};
pub(crate) use error::BackendSnafu;
pub use location::{ObjectLocation, join_location};

use std::{fmt, sync::Arc};

use bytes::Bytes;
use object_store::{
    ObjectStore, PutMode, PutPayload,
    aws::{AmazonS3Builder, S3ConditionalPut},
    local::LocalFileSystem,
    memory::InMemory,
    path::Path as ObjectPath,
};
use snafu::prelude::*;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Scheme for Amazon S3 (and S3-compatible) buckets.
pub const SCHEME_S3: &str = "s3";
/// Scheme for the local filesystem; the bucket part is always empty.
pub const SCHEME_FILE: &str = "file";
/// Scheme for a process-local in-memory store.
pub const SCHEME_MEMORY: &str = "memory";

/// Storage I/O bound to a single scheme and bucket.
///
/// Cloning is cheap; all clones share the same underlying store.
#[derive(Clone)]
pub struct FileIo {
    scheme: String,
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for FileIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileIo")
            .field("scheme", &self.scheme)
            .field("bucket", &self.bucket)
            .field("store", &self.store.to_string())
            .finish()
    }
}

impl FileIo {
    /// Open the store that serves `root`.
    ///
    /// - `s3://bucket/...` builds an S3 client from the standard `AWS_*`
    ///   environment variables, with conditional puts enabled so create-only
    ///   writes are honoured.
    /// - `file:///...` uses the local filesystem.
    /// - `memory://bucket/...` creates a fresh, empty in-memory store.
    pub fn for_location(root: &str) -> StorageResult<Self> {
        let (scheme, bucket) = match root.split_once("://") {
            Some((scheme, rest)) => {
                let bucket = rest.split_once('/').map_or(rest, |(b, _)| b);
                (scheme.to_ascii_lowercase(), bucket.to_string())
            }
            None => {
                return Err(StorageError::InvalidLocation {
                    location: root.to_string(),
                    reason: "missing <scheme>:// prefix".to_string(),
                });
            }
        };

        let store: Arc<dyn ObjectStore> = match scheme.as_str() {
            SCHEME_S3 => {
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(&bucket)
                    .with_conditional_put(S3ConditionalPut::ETagMatch)
                    .build()
                    .map_err(BackendError::ObjectStore)
                    .context(BackendSnafu {
                        location: root.to_string(),
                    })?;
                Arc::new(s3)
            }
            SCHEME_FILE => Arc::new(LocalFileSystem::new()),
            SCHEME_MEMORY => Arc::new(InMemory::new()),
            other => {
                return Err(StorageError::UnsupportedScheme {
                    scheme: other.to_string(),
                    location: root.to_string(),
                });
            }
        };

        Ok(Self {
            scheme,
            bucket,
            store,
        })
    }

    /// The raw `object_store` handle.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Resolve a fully qualified location to a key in the bound store.
    fn resolve(&self, location: &str) -> StorageResult<ObjectPath> {
        let parsed = ObjectLocation::parse(location)?;
        if parsed.scheme() != self.scheme || parsed.bucket() != self.bucket {
            return Err(StorageError::ForeignLocation {
                location: location.to_string(),
                scheme: self.scheme.clone(),
                bucket: self.bucket.clone(),
            });
        }

        ObjectPath::parse(parsed.key())
            .map_err(BackendError::Path)
            .context(BackendSnafu {
                location: location.to_string(),
            })
    }

    /// Put the full payload at `location` in a single request, replacing any
    /// existing object.
    pub async fn write(&self, location: &str, contents: Bytes) -> StorageResult<()> {
        let path = self.resolve(location)?;
        tracing::debug!(location, bytes = contents.len(), "put object");

        self.store
            .put(&path, PutPayload::from(contents))
            .await
            .map_err(|e| StorageError::from_object_store(location, e))?;
        Ok(())
    }

    /// Put the payload only if no object exists at `location`.
    ///
    /// Fails with [`StorageError::AlreadyExists`] when another writer got
    /// there first; the commit protocol relies on this as its guard.
    pub async fn write_new(&self, location: &str, contents: Bytes) -> StorageResult<()> {
        let path = self.resolve(location)?;
        tracing::debug!(location, bytes = contents.len(), "put object (create-only)");

        self.store
            .put_opts(&path, PutPayload::from(contents), PutMode::Create.into())
            .await
            .map_err(|e| StorageError::from_object_store(location, e))?;
        Ok(())
    }

    /// Read the whole object at `location`.
    pub async fn read(&self, location: &str) -> StorageResult<Bytes> {
        let path = self.resolve(location)?;
        tracing::debug!(location, "get object");

        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| StorageError::from_object_store(location, e))?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::from_object_store(location, e))
    }

    /// Read the object at `location` as UTF-8 text.
    pub async fn read_to_string(&self, location: &str) -> StorageResult<String> {
        let bytes = self.read(location).await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::InvalidLocation {
            location: location.to_string(),
            reason: format!("object is not valid UTF-8: {e}"),
        })
    }

    /// Whether an object exists at `location`.
    pub async fn exists(&self, location: &str) -> StorageResult<bool> {
        match self.size(location).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Size in bytes of the object at `location`.
    pub async fn size(&self, location: &str) -> StorageResult<u64> {
        let path = self.resolve(location)?;
        let meta = self
            .store
            .head(&path)
            .await
            .map_err(|e| StorageError::from_object_store(location, e))?;
        Ok(meta.size as u64)
    }

    /// Delete the object at `location`. Deleting a missing object is not an
    /// error.
    pub async fn delete(&self, location: &str) -> StorageResult<()> {
        let path = self.resolve(location)?;
        tracing::debug!(location, "delete object");

        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::from_object_store(location, e)),
        }
    }
}
