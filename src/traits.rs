//! Connector capability contracts and the connector registry.
//!
//! Every upstream system is reached through a [`SourceConnector`] and every
//! downstream knowledge store through a [`TargetConnector`]. Concrete
//! connectors are independent implementations; the engine only ever sees the
//! trait objects.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           ConnectorRegistry              │
//! │   kind name ──▶ factory(name, table)     │
//! │  ┌────────────┐        ┌─────────────┐   │
//! │  │ filesystem │        │  directory  │   │
//! │  │  (source)  │        │  (target)   │   │
//! │  └────────────┘        └─────────────┘   │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        Engine::run() → plan → reconcile
//! ```
//!
//! # Usage
//!
//! ```rust
//! use context_sync::traits::ConnectorRegistry;
//!
//! let mut registry = ConnectorRegistry::with_builtins();
//! // registry.register_source("notion", build_notion_source);
//! assert!(registry.source_kinds().contains(&"filesystem"));
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{Config, ConnectorTables};
use crate::models::DocumentMetadata;
use crate::staging::Staging;

// ═══════════════════════════════════════════════════════════════════════
// Source contract
// ═══════════════════════════════════════════════════════════════════════

/// A source's metadata listing: either fully materialized or produced lazily.
///
/// The fetcher drains both forms the same way before planning.
pub enum MetadataListing {
    List(Vec<DocumentMetadata>),
    Stream(BoxStream<'static, Result<DocumentMetadata>>),
}

impl From<Vec<DocumentMetadata>> for MetadataListing {
    fn from(items: Vec<DocumentMetadata>) -> Self {
        MetadataListing::List(items)
    }
}

/// Read-only access to one upstream system.
///
/// # Example
///
/// ```rust
/// use std::path::PathBuf;
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use chrono::Utc;
/// use context_sync::models::DocumentMetadata;
/// use context_sync::staging::Staging;
/// use context_sync::traits::{MetadataListing, SourceConnector};
///
/// pub struct NotesSource;
///
/// #[async_trait]
/// impl SourceConnector for NotesSource {
///     fn provider_id(&self) -> &str { "notes" }
///
///     async fn fetch_documents_metadata(&self) -> Result<MetadataListing> {
///         Ok(vec![DocumentMetadata::new("notes", "1", "First note", Utc::now())].into())
///     }
///
///     async fn download_document_content(
///         &self,
///         document_id: &str,
///         staging: &Staging,
///     ) -> Result<PathBuf> {
///         Ok(staging.stage_bytes(document_id, Some("txt"), b"hello").await?)
///     }
/// }
/// ```
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Provider id stamped on every document this connector lists.
    ///
    /// Must not contain the document id delimiter (`:`).
    fn provider_id(&self) -> &str;

    /// Connector kind, as registered in [`ConnectorRegistry`].
    fn kind(&self) -> &str {
        "custom"
    }

    /// List identity, title, and modification time of every document.
    ///
    /// Must not fetch content.
    async fn fetch_documents_metadata(&self) -> Result<MetadataListing>;

    /// Materialize a document's content inside `staging` and return the path.
    async fn download_document_content(
        &self,
        document_id: &str,
        staging: &Staging,
    ) -> Result<PathBuf>;
}

// ═══════════════════════════════════════════════════════════════════════
// Target contract
// ═══════════════════════════════════════════════════════════════════════

/// Listing plus mutation access to one downstream knowledge store.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Instance name used in logs and errors.
    fn name(&self) -> &str;

    fn kind(&self) -> &str {
        "custom"
    }

    async fn fetch_documents_metadata(&self) -> Result<Vec<DocumentMetadata>>;

    async fn create_document_from_file(&self, metadata: &DocumentMetadata, path: &Path)
        -> Result<()>;

    async fn update_document_from_file(&self, metadata: &DocumentMetadata, path: &Path)
        -> Result<()>;

    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Builds a source connector from its instance name and config table.
pub type SourceFactory = fn(&str, toml::Table) -> Result<Arc<dyn SourceConnector>>;

/// Builds a target connector from its instance name and config table.
pub type TargetFactory = fn(&str, toml::Table) -> Result<Arc<dyn TargetConnector>>;

/// Provider id for a built-in connector instance: `"{kind}.{name}"`.
pub fn provider_label(kind: &str, name: &str) -> String {
    format!("{}.{}", kind, name)
}

/// Maps connector kind names to factories.
///
/// Populated explicitly at startup; [`build_sources`](Self::build_sources)
/// and [`build_targets`](Self::build_targets) turn a [`Config`] into
/// connector instances.
pub struct ConnectorRegistry {
    sources: BTreeMap<String, SourceFactory>,
    targets: BTreeMap<String, TargetFactory>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            targets: BTreeMap::new(),
        }
    }

    /// Create a registry with the built-in `filesystem` source and
    /// `directory` target.
    pub fn with_builtins() -> Self {
        use crate::connector_dir::DirectoryTarget;
        use crate::connector_fs::FilesystemSource;

        let mut registry = Self::new();
        registry.register_source(FilesystemSource::KIND, FilesystemSource::factory);
        registry.register_target(DirectoryTarget::KIND, DirectoryTarget::factory);
        registry
    }

    /// Register (or replace) a source factory.
    pub fn register_source(&mut self, kind: &str, factory: SourceFactory) {
        self.sources.insert(kind.to_string(), factory);
    }

    /// Register (or replace) a target factory.
    pub fn register_target(&mut self, kind: &str, factory: TargetFactory) {
        self.targets.insert(kind.to_string(), factory);
    }

    pub fn source_kinds(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn target_kinds(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }

    /// Instantiate every `[sources.<kind>.<name>]` entry, sorted by kind then name.
    pub fn build_sources(&self, config: &Config) -> Result<Vec<Arc<dyn SourceConnector>>> {
        build_all(&config.sources, &self.sources, "source")
    }

    /// Instantiate every `[targets.<kind>.<name>]` entry, sorted by kind then name.
    pub fn build_targets(&self, config: &Config) -> Result<Vec<Arc<dyn TargetConnector>>> {
        build_all(&config.targets, &self.targets, "target")
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_all<T: ?Sized>(
    tables: &ConnectorTables,
    factories: &BTreeMap<String, fn(&str, toml::Table) -> Result<Arc<T>>>,
    role: &str,
) -> Result<Vec<Arc<T>>> {
    let mut built = Vec::new();
    for (kind, instances) in tables {
        let factory = factories.get(kind).ok_or_else(|| {
            let known: Vec<&str> = factories.keys().map(String::as_str).collect();
            anyhow!(
                "Unknown {} connector kind: '{}'. Available: {}",
                role,
                kind,
                known.join(", ")
            )
        })?;
        for (name, table) in instances {
            let connector = factory(name, table.clone())
                .map_err(|e| e.context(format!("Failed to build {} '{}.{}'", role, kind, name)))?;
            built.push(connector);
        }
    }
    Ok(built)
}
