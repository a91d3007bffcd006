//! Directory-backed target knowledge store.
//!
//! Keeps synced documents in a local directory:
//!
//! ```text
//! <root>/
//! ├── manifest.json          # metadata of every stored document
//! └── documents/
//!     └── <sha256(id)>.<ext> # content, one file per document
//! ```
//!
//! The stored `last_modified` is the value reported by the source, so a
//! re-run over unchanged sources plans nothing but skips.
//!
//! # Configuration
//!
//! ```toml
//! [targets.directory.kb]
//! root = "./kb"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{document_id_hash, DocumentMetadata};
use crate::traits::TargetConnector;

const MANIFEST_FILE: &str = "manifest.json";
const DOCUMENTS_DIR: &str = "documents";

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryTargetConfig {
    pub root: PathBuf,
}

/// One stored document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub metadata: DocumentMetadata,
    /// File name inside `documents/`.
    pub file: String,
}

/// On-disk manifest, keyed by document id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub documents: BTreeMap<String, ManifestEntry>,
}

pub struct DirectoryTarget {
    name: String,
    root: PathBuf,
    /// Serializes manifest read-modify-write cycles.
    lock: Mutex<()>,
}

impl DirectoryTarget {
    pub const KIND: &'static str = "directory";

    pub fn new(name: &str, config: DirectoryTargetConfig) -> Self {
        Self {
            name: name.to_string(),
            root: config.root,
            lock: Mutex::new(()),
        }
    }

    /// Registry factory for `[targets.directory.<name>]`.
    pub fn factory(name: &str, table: toml::Table) -> Result<Arc<dyn TargetConnector>> {
        let config: DirectoryTargetConfig = toml::Value::Table(table)
            .try_into()
            .with_context(|| format!("Invalid directory target config for '{}'", name))?;
        Ok(Arc::new(Self::new(name, config)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a stored document's content, if present.
    pub async fn document_path(&self, document_id: &str) -> Result<Option<PathBuf>> {
        let manifest = self.load_manifest().await?;
        Ok(manifest
            .documents
            .get(document_id)
            .map(|entry| self.root.join(DOCUMENTS_DIR).join(&entry.file)))
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    async fn load_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Corrupt manifest: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Write the manifest via `<path>.tmp` + rename.
    async fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let path = self.manifest_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(manifest)?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn store(&self, metadata: &DocumentMetadata, path: &Path, must_exist: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.load_manifest().await?;
        let document_id = metadata.document_id();

        let previous = manifest.documents.get(&document_id).cloned();
        match (&previous, must_exist) {
            (None, true) => bail!("Document '{}' does not exist in target", document_id),
            (Some(_), false) => bail!("Document '{}' already exists in target", document_id),
            _ => {}
        }

        let file = stored_file_name(&document_id, metadata.file_extension.as_deref());
        let documents_dir = self.root.join(DOCUMENTS_DIR);
        tokio::fs::create_dir_all(&documents_dir)
            .await
            .with_context(|| format!("Failed to create {}", documents_dir.display()))?;
        tokio::fs::copy(path, documents_dir.join(&file))
            .await
            .with_context(|| format!("Failed to copy {} into target", path.display()))?;

        // An update may change the extension, leaving the old file behind.
        if let Some(old) = previous.filter(|old| old.file != file) {
            remove_if_present(&documents_dir.join(old.file)).await?;
        }

        manifest.documents.insert(
            document_id,
            ManifestEntry {
                metadata: metadata.clone(),
                file,
            },
        );
        self.save_manifest(&manifest).await
    }
}

fn stored_file_name(document_id: &str, extension: Option<&str>) -> String {
    let hash = document_id_hash(document_id);
    match extension.map(|e| e.trim_start_matches('.')) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", hash, ext),
        _ => hash,
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[async_trait]
impl TargetConnector for DirectoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn fetch_documents_metadata(&self) -> Result<Vec<DocumentMetadata>> {
        let manifest = self.load_manifest().await?;
        Ok(manifest
            .documents
            .into_values()
            .map(|entry| entry.metadata)
            .collect())
    }

    async fn create_document_from_file(&self, metadata: &DocumentMetadata, path: &Path) -> Result<()> {
        self.store(metadata, path, false).await
    }

    async fn update_document_from_file(&self, metadata: &DocumentMetadata, path: &Path) -> Result<()> {
        self.store(metadata, path, true).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.load_manifest().await?;
        let Some(entry) = manifest.documents.remove(document_id) else {
            bail!("Document '{}' does not exist in target", document_id);
        };
        remove_if_present(&self.root.join(DOCUMENTS_DIR).join(entry.file)).await?;
        self.save_manifest(&manifest).await
    }
}
