//! Core data models used throughout Context Sync.
//!
//! These types represent the document metadata, operations, and plans that
//! flow from the connectors through the planner into the reconciler. None of
//! them carry document content.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between the provider id and the source id in a document id.
pub const DOCUMENT_ID_DELIMITER: char = ':';

/// Identity, title, and modification time of one document as reported by a
/// connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Owning source connector (e.g. `"filesystem.docs"`).
    pub provider_id: String,
    /// Connector-defined opaque id. May contain [`DOCUMENT_ID_DELIMITER`].
    pub source_id: String,
    pub title: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

impl DocumentMetadata {
    pub fn new(
        provider_id: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            source_id: source_id.into(),
            title: title.into(),
            last_modified,
            file_extension: None,
        }
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// The derived `providerId:sourceId` identifier.
    pub fn document_id(&self) -> String {
        compose_document_id(&self.provider_id, &self.source_id)
    }
}

/// Build a document id from its parts.
pub fn compose_document_id(provider_id: &str, source_id: &str) -> String {
    format!("{}{}{}", provider_id, DOCUMENT_ID_DELIMITER, source_id)
}

/// Split a document id into `(provider_id, source_id)`.
///
/// Only the first delimiter separates the parts; any delimiter inside the
/// source id is preserved. Returns `None` when the id has no delimiter.
pub fn parse_document_id(document_id: &str) -> Option<(&str, &str)> {
    document_id.split_once(DOCUMENT_ID_DELIMITER)
}

/// Hex SHA-256 of a document id, used to name staged and stored files.
pub fn document_id_hash(document_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// What a [`SyncOperation`] does to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Skip,
}

impl OperationKind {
    /// Kinds that mutate the target, in the order the reconciler runs them.
    pub const MUTATING: [OperationKind; 3] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Skip => "skip",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned step. `reason` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub document_metadata: DocumentMetadata,
    pub reason: String,
}

impl SyncOperation {
    pub fn new(
        kind: OperationKind,
        document_metadata: DocumentMetadata,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            document_metadata,
            reason: reason.into(),
        }
    }

    pub fn document_id(&self) -> String {
        self.document_metadata.document_id()
    }
}

/// Per-kind operation counts of a [`SyncPlan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub skip: usize,
}

impl PlanSummary {
    pub fn from_operations(operations: &[SyncOperation]) -> Self {
        let mut summary = PlanSummary {
            total: operations.len(),
            ..Default::default()
        };
        for op in operations {
            match op.kind {
                OperationKind::Create => summary.create += 1,
                OperationKind::Update => summary.update += 1,
                OperationKind::Delete => summary.delete += 1,
                OperationKind::Skip => summary.skip += 1,
            }
        }
        summary
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        match kind {
            OperationKind::Create => self.create,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
            OperationKind::Skip => self.skip,
        }
    }

    /// Operations that would touch the target.
    pub fn changes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} operations ({} create, {} update, {} delete, {} skip)",
            self.total, self.create, self.update, self.delete, self.skip
        )
    }
}

/// An immutable, ordered set of operations plus their summary.
///
/// The summary is computed at construction, so it always agrees with the
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    operations: Vec<SyncOperation>,
    summary: PlanSummary,
}

impl SyncPlan {
    pub fn new(operations: Vec<SyncOperation>) -> Self {
        let summary = PlanSummary::from_operations(&operations);
        Self {
            operations,
            summary,
        }
    }

    pub fn operations(&self) -> &[SyncOperation] {
        &self.operations
    }

    pub fn summary(&self) -> &PlanSummary {
        &self.summary
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations of one kind, in plan order.
    pub fn operations_of(&self, kind: OperationKind) -> impl Iterator<Item = &SyncOperation> {
        self.operations.iter().filter(move |op| op.kind == kind)
    }
}
