//! Per-run scratch area for document content.
//!
//! A [`Staging`] owns one uniquely named temporary directory. Source
//! connectors write downloaded content into it and hand the resulting path
//! to the reconciler, which passes it unchanged to the target. Content never
//! sits in reconciler memory.
//!
//! File names are the SHA-256 of the document id plus the connector-chosen
//! extension, so concurrent operations in one batch never collide.
//!
//! The directory is removed by [`Staging::release`], or on drop if the run
//! unwinds before reaching it.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::models::document_id_hash;

const STAGING_PREFIX: &str = "ctxsync-staging-";

pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a fresh staging directory under `parent`, or the system temp
    /// directory when `None`.
    pub fn acquire(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    /// Root of the staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deterministic location for a document's staged content.
    pub fn file_path(&self, document_id: &str, extension: Option<&str>) -> PathBuf {
        let mut name = document_id_hash(document_id);
        if let Some(ext) = extension.map(|e| e.trim_start_matches('.')) {
            if !ext.is_empty() {
                name.push('.');
                name.push_str(ext);
            }
        }
        self.dir.path().join(name)
    }

    /// Write in-memory content and return its staged path.
    pub async fn stage_bytes(
        &self,
        document_id: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.file_path(document_id, extension);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Stream content from `reader` into the staged file.
    pub async fn stage_reader<R>(
        &self,
        document_id: &str,
        extension: Option<&str>,
        reader: &mut R,
    ) -> io::Result<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.file_path(document_id, extension);
        let mut file = tokio::fs::File::create(&path).await?;
        tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Copy an existing file into staging.
    pub async fn stage_file(
        &self,
        document_id: &str,
        extension: Option<&str>,
        source: &Path,
    ) -> io::Result<PathBuf> {
        let path = self.file_path(document_id, extension);
        tokio::fs::copy(source, &path).await?;
        Ok(path)
    }

    /// Recursively remove the staging directory.
    pub fn release(self) -> io::Result<()> {
        self.dir.close()
    }
}
