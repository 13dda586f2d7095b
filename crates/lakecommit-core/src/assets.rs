//! Bundled, read-only input files.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::{Backtrace, prelude::*};

/// Convenience alias for asset results.
pub type AssetResult<T> = Result<T, AssetError>;

/// Errors raised while reading bundled assets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AssetError {
    /// The asset is not present in the asset source.
    #[snafu(display("Missing bundled asset {name:?} in {origin}"))]
    Missing {
        /// Asset name.
        name: String,
        /// Directory or embedded set that was searched.
        origin: String,
    },

    /// Asset names are plain file names.
    #[snafu(display("Invalid asset name {name:?}"))]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Any other I/O failure while reading the asset.
    #[snafu(display("Failed to read asset {}: {source}", path.display()))]
    Read {
        /// Full path of the asset.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

const EMBEDDED_ORIGIN: &str = "embedded assets";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Dir(PathBuf),
    Embedded(BTreeMap<&'static str, &'static [u8]>),
}

/// Read-only input files, either compiled into the binary or stored in a
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assets {
    source: Source,
}

impl Assets {
    /// Assets stored under `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Dir(dir.into()),
        }
    }

    /// Assets compiled into the binary, keyed by file name.
    pub fn embedded(files: impl IntoIterator<Item = (&'static str, &'static [u8])>) -> Self {
        Self {
            source: Source::Embedded(files.into_iter().collect()),
        }
    }

    /// Read the whole asset called `name`.
    pub async fn read(&self, name: &str) -> AssetResult<Bytes> {
        let valid = !name.is_empty()
            && Path::new(name).file_name().is_some_and(|f| f == name);
        ensure!(valid, InvalidNameSnafu { name });

        match &self.source {
            Source::Embedded(files) => {
                let bytes = *files.get(name).context(MissingSnafu {
                    name,
                    origin: EMBEDDED_ORIGIN,
                })?;
                tracing::debug!(name, bytes = bytes.len(), "read embedded asset");
                Ok(Bytes::from_static(bytes))
            }
            Source::Dir(dir) => {
                let path = dir.join(name);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        tracing::debug!(path = %path.display(), bytes = bytes.len(), "read asset");
                        Ok(Bytes::from(bytes))
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => MissingSnafu {
                        name,
                        origin: dir.display().to_string(),
                    }
                    .fail(),
                    Err(source) => Err(source).context(ReadSnafu { path }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn reads_existing_asset() -> TestResult {
        let tmp = TempDir::new()?;
        tokio::fs::write(tmp.path().join("sample.parquet"), b"PAR1").await?;

        let assets = Assets::from_dir(tmp.path());
        assert_eq!(assets.read("sample.parquet").await?, Bytes::from_static(b"PAR1"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_asset_is_reported() -> TestResult {
        let tmp = TempDir::new()?;
        let assets = Assets::from_dir(tmp.path());

        let err = assets.read("sample.parquet").await.expect_err("missing");
        assert!(matches!(err, AssetError::Missing { ref name, .. } if name == "sample.parquet"));
        Ok(())
    }

    #[tokio::test]
    async fn path_like_names_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let assets = Assets::from_dir(tmp.path());

        for name in ["", "../secret", "a/b.parquet", "."] {
            let err = assets.read(name).await.expect_err(name);
            assert!(matches!(err, AssetError::InvalidName { .. }), "{name:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn embedded_asset_is_served_without_touching_disk() -> TestResult {
        let assets = Assets::embedded([("sample.parquet", b"PAR1".as_slice())]);

        assert_eq!(assets.read("sample.parquet").await?, Bytes::from_static(b"PAR1"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_embedded_asset_is_missing() -> TestResult {
        let assets = Assets::embedded([("sample.parquet", b"PAR1".as_slice())]);

        let err = assets.read("other.parquet").await.expect_err("missing");
        assert!(matches!(
            err,
            AssetError::Missing { ref name, ref origin }
                if name == "other.parquet" && origin == EMBEDDED_ORIGIN
        ));

        let err = assets.read("../sample.parquet").await.expect_err("path-like");
        assert!(matches!(err, AssetError::InvalidName { .. }));
        Ok(())
    }
}
