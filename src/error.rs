//! Error types for the reconciliation core.
//!
//! Connector implementations report failures as [`anyhow::Error`]; the core
//! wraps them into the typed errors below so callers can tell a fatal
//! metadata failure apart from the end-of-run aggregate of per-operation
//! failures.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::SyncOperation;

/// Which side of the diff a metadata listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Failure of a single create, update, or delete.
///
/// Recorded per operation; never stops sibling operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("no source connector registered for provider '{provider_id}'")]
    ConnectorNotFound { provider_id: String },

    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    #[error("upload failed: {0:#}")]
    Upload(anyhow::Error),

    #[error("delete failed: {0:#}")]
    Delete(anyhow::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// An operation paired with the error it failed with.
#[derive(Debug)]
pub struct OperationFailure {
    pub operation: SyncOperation,
    pub error: OperationError,
}

/// Raised once at the end of a reconciler run when any operation failed.
#[derive(Debug)]
pub struct AggregateReconciliationError {
    /// Name of the target the run was applied to.
    pub target: String,
    /// Number of non-skip operations attempted.
    pub attempted: usize,
    pub failures: Vec<OperationFailure>,
}

impl fmt::Display for AggregateReconciliationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} operations failed against target '{}':",
            self.failures.len(),
            self.attempted,
            self.target
        )?;
        for failure in &self.failures {
            write!(
                f,
                "\n  - {} {}: {}",
                failure.operation.kind,
                failure.operation.document_id(),
                failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateReconciliationError {}

/// Errors returned by [`Reconciler::execute`](crate::reconcile::Reconciler::execute).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to acquire staging directory: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    Aggregate(#[from] AggregateReconciliationError),
}

/// Top-level error of an engine run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A connector failed while listing; the diff would be unsound.
    #[error("failed to fetch {side} metadata from '{connector}': {error:#}")]
    MetadataFetch {
        side: Side,
        connector: String,
        error: anyhow::Error,
    },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl SyncError {
    pub(crate) fn metadata(side: Side, connector: &str, error: anyhow::Error) -> Self {
        SyncError::MetadataFetch {
            side,
            connector: connector.to_string(),
            error,
        }
    }
}
