//! Plan execution against one target.
//!
//! The [`Reconciler`] applies a [`SyncPlan`] in three independent groups
//! (creates, then updates, then deletes). Each group runs as a sequence of
//! fixed-size batches: every operation in a batch starts at once, the batch
//! settles completely, and a short delay follows before the next batch. This
//! caps in-flight calls to the batch size.
//!
//! A failing operation is logged and recorded, never fatal. Once every
//! operation has been attempted the run fails with an
//! [`AggregateReconciliationError`] if anything went wrong.
//!
//! The staging directory brackets the whole run and is removed on every exit
//! path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;

use crate::error::{AggregateReconciliationError, OperationError, OperationFailure, ReconcileError};
use crate::logging::{fields, NoopLogger, SyncLogger};
use crate::models::{OperationKind, SyncOperation, SyncPlan};
use crate::staging::Staging;
use crate::traits::{SourceConnector, TargetConnector};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Source connectors keyed by provider id.
pub type SourceMap = HashMap<String, Arc<dyn SourceConnector>>;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Log intended effects only; no connector calls, no staging.
    pub dry_run: bool,
    /// Maximum operations in flight per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches of a group.
    pub batch_delay: Duration,
    /// Per-operation deadline. `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
    /// Parent for the staging directory; system temp when `None`.
    pub staging_dir: Option<PathBuf>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            operation_timeout: None,
            staging_dir: None,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub target: String,
    /// Non-skip operations in the plan.
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub dry_run: bool,
}

pub struct Reconciler {
    sources: SourceMap,
    target: Arc<dyn TargetConnector>,
    options: ReconcileOptions,
    logger: Arc<dyn SyncLogger>,
}

impl Reconciler {
    pub fn new(
        sources: SourceMap,
        target: Arc<dyn TargetConnector>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            sources,
            target,
            options,
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Apply `plan` to the target.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Staging`] if the staging directory cannot be created
    /// (nothing has run yet), or [`ReconcileError::Aggregate`] listing every
    /// operation that failed.
    pub async fn execute(&self, plan: &SyncPlan) -> Result<ReconcileReport, ReconcileError> {
        let target = self.target.name().to_string();
        let summary = plan.summary();
        let total = summary.changes();

        self.logger.info(
            "Reconciling target",
            &fields(json!({
                "target": target,
                "create": summary.create,
                "update": summary.update,
                "delete": summary.delete,
                "skip": summary.skip,
                "dryRun": self.options.dry_run,
            })),
        );

        for op in plan.operations_of(OperationKind::Skip) {
            self.logger.debug(
                "Skipping document",
                &fields(json!({ "documentId": op.document_id(), "reason": op.reason })),
            );
        }

        if self.options.dry_run {
            for kind in OperationKind::MUTATING {
                for op in plan.operations_of(kind) {
                    self.logger.info(
                        &format!("[dry-run] Would {} document", kind),
                        &fields(json!({
                            "documentId": op.document_id(),
                            "title": op.document_metadata.title,
                            "reason": op.reason,
                        })),
                    );
                }
            }
            return Ok(ReconcileReport {
                target,
                total,
                succeeded: 0,
                skipped: summary.skip,
                dry_run: true,
            });
        }

        let staging = Staging::acquire(self.options.staging_dir.as_deref())?;
        self.logger.debug(
            "Acquired staging directory",
            &fields(json!({ "path": staging.path().display().to_string() })),
        );

        let mut failures = Vec::new();
        for kind in OperationKind::MUTATING {
            let ops: Vec<&SyncOperation> = plan.operations_of(kind).collect();
            failures.extend(self.process_group(kind, &ops, &staging).await);
        }

        let staging_path = staging.path().display().to_string();
        if let Err(e) = staging.release() {
            self.logger.warn(
                "Failed to remove staging directory",
                &fields(json!({ "path": staging_path, "error": e.to_string() })),
            );
        }

        if !failures.is_empty() {
            self.logger.error(
                "Reconciliation finished with failures",
                &fields(json!({ "target": target, "failed": failures.len(), "total": total })),
            );
            return Err(AggregateReconciliationError {
                target,
                attempted: total,
                failures,
            }
            .into());
        }

        self.logger.info(
            "Reconciliation finished",
            &fields(json!({ "target": target, "total": total, "succeeded": total })),
        );
        Ok(ReconcileReport {
            target,
            total,
            succeeded: total,
            skipped: summary.skip,
            dry_run: false,
        })
    }

    async fn process_group(
        &self,
        kind: OperationKind,
        ops: &[&SyncOperation],
        staging: &Staging,
    ) -> Vec<OperationFailure> {
        let mut failures = Vec::new();
        if ops.is_empty() {
            return failures;
        }

        let batch_size = self.options.batch_size.max(1);
        let batch_count = ops.len().div_ceil(batch_size);
        self.logger.debug(
            &format!("Processing {} operations", kind),
            &fields(json!({ "count": ops.len(), "batches": batch_count })),
        );

        for (i, batch) in ops.chunks(batch_size).enumerate() {
            if i > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let results = join_all(batch.iter().map(|op| self.run_operation(op, staging))).await;

            for (op, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => self.logger.debug(
                        &format!("{} succeeded", kind),
                        &fields(json!({ "documentId": op.document_id() })),
                    ),
                    Err(error) => {
                        self.logger.error(
                            &format!("{} failed", kind),
                            &fields(json!({
                                "documentId": op.document_id(),
                                "error": error.to_string(),
                            })),
                        );
                        failures.push(OperationFailure {
                            operation: (*op).clone(),
                            error,
                        });
                    }
                }
            }
        }

        failures
    }

    async fn run_operation(
        &self,
        op: &SyncOperation,
        staging: &Staging,
    ) -> Result<(), OperationError> {
        match self.options.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.apply(op, staging))
                .await
                .unwrap_or(Err(OperationError::TimedOut(limit))),
            None => self.apply(op, staging).await,
        }
    }

    async fn apply(&self, op: &SyncOperation, staging: &Staging) -> Result<(), OperationError> {
        let metadata = &op.document_metadata;
        let document_id = op.document_id();

        match op.kind {
            OperationKind::Create | OperationKind::Update => {
                let source = self.sources.get(&metadata.provider_id).ok_or_else(|| {
                    OperationError::ConnectorNotFound {
                        provider_id: metadata.provider_id.clone(),
                    }
                })?;
                let path = source
                    .download_document_content(&document_id, staging)
                    .await
                    .map_err(OperationError::Download)?;

                let uploaded = if op.kind == OperationKind::Create {
                    self.target.create_document_from_file(metadata, &path).await
                } else {
                    self.target.update_document_from_file(metadata, &path).await
                };
                uploaded.map_err(OperationError::Upload)
            }
            OperationKind::Delete => self
                .target
                .delete_document(&document_id)
                .await
                .map_err(OperationError::Delete),
            OperationKind::Skip => Ok(()),
        }
    }
}
