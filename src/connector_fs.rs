//! Filesystem source connector.
//!
//! Lists files under a root directory as documents. The source id is the
//! `/`-separated path relative to the root, the title is the file name, and
//! the modification time comes from the file's mtime.
//!
//! # Configuration
//!
//! ```toml
//! [sources.filesystem.docs]
//! root = "./docs"
//! include_globs = ["**/*.md", "**/*.txt"]
//! exclude_globs = ["drafts/**"]
//! follow_symlinks = false
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::models::{parse_document_id, DocumentMetadata};
use crate::staging::Staging;
use crate::traits::{provider_label, MetadataListing, SourceConnector};

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

pub struct FilesystemSource {
    provider_id: String,
    config: FilesystemSourceConfig,
}

impl FilesystemSource {
    pub const KIND: &'static str = "filesystem";

    pub fn new(name: &str, config: FilesystemSourceConfig) -> Self {
        Self {
            provider_id: provider_label(Self::KIND, name),
            config,
        }
    }

    /// Registry factory for `[sources.filesystem.<name>]`.
    pub fn factory(name: &str, table: toml::Table) -> Result<Arc<dyn SourceConnector>> {
        let config: FilesystemSourceConfig = toml::Value::Table(table)
            .try_into()
            .with_context(|| format!("Invalid filesystem source config for '{}'", name))?;
        Ok(Arc::new(Self::new(name, config)))
    }

    fn scan(&self) -> Result<Vec<DocumentMetadata>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!(
                "Filesystem source root does not exist: {}",
                root.display()
            );
        }

        let include_set = build_globset(&self.config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        let mut items = Vec::new();

        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative_id(relative);

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !include_set.is_match(&rel_str) {
                continue;
            }

            items.push(self.file_metadata(path, rel_str)?);
        }

        // Sort for deterministic ordering
        items.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        Ok(items)
    }

    fn file_metadata(&self, path: &Path, source_id: String) -> Result<DocumentMetadata> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read mtime of {}", path.display()))?;

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut doc = DocumentMetadata::new(
            self.provider_id.clone(),
            source_id,
            title,
            DateTime::<Utc>::from(modified),
        );
        if let Some(ext) = path.extension() {
            doc = doc.with_file_extension(ext.to_string_lossy());
        }
        Ok(doc)
    }

    /// Map a source id back to a file under the root, refusing escapes.
    fn resolve(&self, source_id: &str) -> Result<PathBuf> {
        let relative = Path::new(source_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if source_id.is_empty() || escapes {
            bail!("Source id '{}' is not a path inside the root", source_id);
        }
        Ok(self.config.root.join(relative))
    }
}

/// Relative path with `/` separators on every platform.
fn relative_id(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl SourceConnector for FilesystemSource {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn fetch_documents_metadata(&self) -> Result<MetadataListing> {
        Ok(self.scan()?.into())
    }

    async fn download_document_content(
        &self,
        document_id: &str,
        staging: &Staging,
    ) -> Result<PathBuf> {
        let (provider, source_id) = parse_document_id(document_id)
            .ok_or_else(|| anyhow!("Malformed document id: '{}'", document_id))?;
        if provider != self.provider_id {
            bail!(
                "Document '{}' does not belong to provider '{}'",
                document_id,
                self.provider_id
            );
        }

        let path = self.resolve(source_id)?;
        let extension = path.extension().map(|e| e.to_string_lossy().to_string());
        staging
            .stage_file(document_id, extension.as_deref(), &path)
            .await
            .with_context(|| format!("Failed to stage {}", path.display()))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
