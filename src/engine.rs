//! Run orchestration.
//!
//! An [`Engine`] fetches the desired state from all sources once, then
//! handles each target in turn: fetch its current state, plan, and execute
//! the plan with a fresh [`Reconciler`]. Targets are isolated from each
//! other; each gets its own staging lifetime, and a failing target does not
//! stop the ones after it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::fetch::{fetch_source_metadata, fetch_target_metadata};
use crate::logging::{fields, NoopLogger, SyncLogger};
use crate::models::{DocumentMetadata, SyncPlan};
use crate::planner;
use crate::reconcile::{ReconcileOptions, ReconcileReport, Reconciler, SourceMap};
use crate::traits::{SourceConnector, TargetConnector};

/// Per-target reports of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub targets: Vec<ReconcileReport>,
}

/// A target's plan, as returned by [`Engine::plan`].
#[derive(Debug, Clone, Serialize)]
pub struct TargetPlan {
    pub target: String,
    pub plan: SyncPlan,
}

pub struct Engine {
    sources: Vec<Arc<dyn SourceConnector>>,
    targets: Vec<Arc<dyn TargetConnector>>,
    options: ReconcileOptions,
    logger: Arc<dyn SyncLogger>,
}

impl Engine {
    pub fn new(
        sources: Vec<Arc<dyn SourceConnector>>,
        targets: Vec<Arc<dyn TargetConnector>>,
    ) -> Self {
        Self {
            sources,
            targets,
            options: ReconcileOptions::default(),
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Synchronize every target.
    ///
    /// # Errors
    ///
    /// Fails immediately if source metadata cannot be fetched. Otherwise all
    /// targets are attempted and the first target failure is returned.
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        let desired = fetch_source_metadata(&self.sources, self.logger.as_ref()).await?;
        let sources = self.source_map();

        let mut report = RunReport::default();
        let mut first_error: Option<SyncError> = None;

        for target in &self.targets {
            match self.sync_target(&desired, &sources, target).await {
                Ok(target_report) => report.targets.push(target_report),
                Err(e) => {
                    self.logger.error(
                        "Target sync failed",
                        &fields(json!({ "target": target.name(), "error": e.to_string() })),
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Compute every target's plan without executing anything.
    pub async fn plan(&self) -> Result<Vec<TargetPlan>, SyncError> {
        let desired = fetch_source_metadata(&self.sources, self.logger.as_ref()).await?;
        let mut plans = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let current = fetch_target_metadata(target.as_ref(), self.logger.as_ref()).await?;
            plans.push(TargetPlan {
                target: target.name().to_string(),
                plan: planner::plan(&desired, &current),
            });
        }
        Ok(plans)
    }

    async fn sync_target(
        &self,
        desired: &[DocumentMetadata],
        sources: &SourceMap,
        target: &Arc<dyn TargetConnector>,
    ) -> Result<ReconcileReport, SyncError> {
        let current = fetch_target_metadata(target.as_ref(), self.logger.as_ref()).await?;
        let plan = planner::plan(desired, &current);

        self.logger.info(
            "Planned target sync",
            &fields(json!({ "target": target.name(), "summary": plan.summary() })),
        );

        let reconciler = Reconciler::new(sources.clone(), Arc::clone(target), self.options.clone())
            .with_logger(Arc::clone(&self.logger));
        Ok(reconciler.execute(&plan).await?)
    }

    /// Index sources by provider id; the first registration of an id wins.
    fn source_map(&self) -> SourceMap {
        let mut map = SourceMap::with_capacity(self.sources.len());
        for source in &self.sources {
            let id = source.provider_id().to_string();
            if map.contains_key(&id) {
                self.logger.warn(
                    "Duplicate source provider id ignored",
                    &fields(json!({ "providerId": id })),
                );
                continue;
            }
            map.insert(id, Arc::clone(source));
        }
        map
    }
}
