use std::fmt;

use crate::storage::{StorageError, StorageResult};

/// A fully qualified object location split into its parts.
///
/// `s3://bucket/warehouse/t/data/a.parquet` parses into scheme `s3`, bucket
/// `bucket`, and key `warehouse/t/data/a.parquet`. For `file:///tmp/wh/x` the
/// bucket is empty and the key is `tmp/wh/x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    scheme: String,
    bucket: String,
    key: String,
}

impl ObjectLocation {
    /// Parse `<scheme>://<bucket>/<key>`.
    ///
    /// The scheme prefix is stripped and the remainder is split at the first
    /// `/`. A missing scheme or an empty key is rejected.
    pub fn parse(location: &str) -> StorageResult<Self> {
        let Some((scheme, rest)) = location.split_once("://") else {
            return Err(invalid(location, "missing <scheme>:// prefix"));
        };
        if scheme.is_empty() {
            return Err(invalid(location, "empty scheme"));
        }

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        let key = key.trim_end_matches('/');
        if key.is_empty() {
            return Err(invalid(location, "empty object key"));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Storage scheme, lower-cased (`s3`, `file`, `memory`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Bucket or container name; empty for `file://` locations.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key inside the bucket, without a leading `/`.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

fn invalid(location: &str, reason: &str) -> StorageError {
    StorageError::InvalidLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}

/// Join a base location and a relative child without doubling separators.
pub fn join_location(base: &str, child: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        child.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_s3_location_splits_bucket_and_key() {
        let loc = ObjectLocation::parse("s3://my-bucket/wh/default.db/t/data/a.parquet")
            .expect("valid location");

        assert_eq!(loc.scheme(), "s3");
        assert_eq!(loc.bucket(), "my-bucket");
        assert_eq!(loc.key(), "wh/default.db/t/data/a.parquet");
    }

    #[test]
    fn parse_file_location_has_empty_bucket() {
        let loc = ObjectLocation::parse("file:///tmp/wh/t/data/a.parquet").expect("valid");

        assert_eq!(loc.scheme(), "file");
        assert_eq!(loc.bucket(), "");
        assert_eq!(loc.key(), "tmp/wh/t/data/a.parquet");
        assert_eq!(loc.to_string(), "file:///tmp/wh/t/data/a.parquet");
    }

    #[test]
    fn parse_lowercases_scheme_and_trims_trailing_slash() {
        let loc = ObjectLocation::parse("S3://b/prefix/").expect("valid");

        assert_eq!(loc.scheme(), "s3");
        assert_eq!(loc.key(), "prefix");
    }

    #[test]
    fn parse_rejects_missing_scheme() {
        let err = ObjectLocation::parse("/tmp/wh").expect_err("no scheme");
        assert!(matches!(err, StorageError::InvalidLocation { .. }));
    }

    #[test]
    fn parse_rejects_bucket_without_key() {
        let err = ObjectLocation::parse("s3://bucket-only").expect_err("no key");
        assert!(matches!(err, StorageError::InvalidLocation { .. }));

        let err = ObjectLocation::parse("s3://bucket/").expect_err("empty key");
        assert!(matches!(err, StorageError::InvalidLocation { .. }));
    }

    #[test]
    fn join_location_handles_separators() {
        assert_eq!(join_location("s3://b/wh/", "/t"), "s3://b/wh/t");
        assert_eq!(join_location("s3://b/wh", "t/data"), "s3://b/wh/t/data");
    }
}
