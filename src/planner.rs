//! Metadata diffing.
//!
//! [`plan`] compares the desired listing (sources) against the current
//! listing (one target) and returns the operations that converge the target.
//! It performs no I/O and never fails.
//!
//! # Rules
//!
//! | Source | Target | Operation |
//! |--------|--------|-----------|
//! | present | absent | `create` |
//! | newer | present | `update` |
//! | same age or older | present | `skip` |
//! | absent | present | `delete` |
//!
//! Creates, updates, and skips come first in source order, followed by
//! deletes in target order.

use std::collections::HashMap;

use crate::models::{DocumentMetadata, OperationKind, SyncOperation, SyncPlan};

/// Target listing keyed by document id, keeping insertion order so residual
/// entries come out in the order the target reported them.
struct TargetIndex<'a> {
    positions: HashMap<String, usize>,
    slots: Vec<Option<&'a DocumentMetadata>>,
}

impl<'a> TargetIndex<'a> {
    fn build(target: &'a [DocumentMetadata]) -> Self {
        let mut index = TargetIndex {
            positions: HashMap::with_capacity(target.len()),
            slots: Vec::with_capacity(target.len()),
        };
        for doc in target {
            match index.positions.get(&doc.document_id()) {
                // A repeated id keeps its first position and takes the latest value.
                Some(&pos) => index.slots[pos] = Some(doc),
                None => {
                    index.positions.insert(doc.document_id(), index.slots.len());
                    index.slots.push(Some(doc));
                }
            }
        }
        index
    }

    /// Remove and return the entry for `document_id`, if still unmatched.
    fn take(&mut self, document_id: &str) -> Option<&'a DocumentMetadata> {
        let pos = self.positions.remove(document_id)?;
        self.slots[pos].take()
    }

    fn residual(self) -> impl Iterator<Item = &'a DocumentMetadata> {
        self.slots.into_iter().flatten()
    }
}

/// Compute the plan that converges `target` toward `source`.
pub fn plan(source: &[DocumentMetadata], target: &[DocumentMetadata]) -> SyncPlan {
    let mut index = TargetIndex::build(target);
    let mut operations = Vec::with_capacity(source.len() + target.len());

    for doc in source {
        let op = match index.take(&doc.document_id()) {
            None => SyncOperation::new(
                OperationKind::Create,
                doc.clone(),
                "Document does not exist in target",
            ),
            Some(existing) if doc.last_modified > existing.last_modified => SyncOperation::new(
                OperationKind::Update,
                doc.clone(),
                format!(
                    "Source modified at {} is newer than target ({})",
                    doc.last_modified.to_rfc3339(),
                    existing.last_modified.to_rfc3339()
                ),
            ),
            Some(_) => SyncOperation::new(
                OperationKind::Skip,
                doc.clone(),
                "Target is up to date",
            ),
        };
        operations.push(op);
    }

    for doc in index.residual() {
        operations.push(SyncOperation::new(
            OperationKind::Delete,
            doc.clone(),
            "Document no longer exists in source",
        ));
    }

    SyncPlan::new(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanSummary;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn doc(provider: &str, source: &str, modified: i64) -> DocumentMetadata {
        DocumentMetadata::new(provider, source, format!("Doc {}", source), ts(modified))
    }

    fn kinds(plan: &SyncPlan) -> Vec<(OperationKind, String)> {
        plan.operations()
            .iter()
            .map(|op| (op.kind, op.document_id()))
            .collect()
    }

    #[test]
    fn empty_inputs_yield_empty_plan() {
        let plan = plan(&[], &[]);
        assert!(plan.is_empty());
        assert_eq!(*plan.summary(), PlanSummary::default());
    }

    #[test]
    fn missing_in_target_is_created() {
        let plan = plan(&[doc("n", "1", 10)], &[]);
        assert_eq!(plan.summary().create, 1);
        let op = &plan.operations()[0];
        assert_eq!(op.kind, OperationKind::Create);
        assert!(op.reason.contains("does not exist in target"));
    }

    #[test]
    fn newer_source_is_updated() {
        let plan = plan(&[doc("n", "1", 20)], &[doc("n", "1", 10)]);
        assert_eq!(
            *plan.summary(),
            PlanSummary {
                total: 1,
                create: 0,
                update: 1,
                delete: 0,
                skip: 0
            }
        );
        assert_eq!(plan.operations()[0].document_metadata.last_modified, ts(20));
    }

    #[test]
    fn equal_or_older_source_is_skipped() {
        let equal = plan(&[doc("n", "1", 10)], &[doc("n", "1", 10)]);
        assert_eq!(kinds(&equal), vec![(OperationKind::Skip, "n:1".into())]);

        let older = plan(&[doc("n", "1", 5)], &[doc("n", "1", 10)]);
        assert_eq!(kinds(&older), vec![(OperationKind::Skip, "n:1".into())]);
    }

    #[test]
    fn target_only_is_deleted() {
        let plan = plan(&[], &[doc("n", "1", 10), doc("n", "2", 10)]);
        assert_eq!(
            kinds(&plan),
            vec![
                (OperationKind::Delete, "n:1".into()),
                (OperationKind::Delete, "n:2".into()),
            ]
        );
    }

    #[test]
    fn identity_is_scoped_to_provider() {
        let plan = plan(&[doc("a", "1", 10)], &[doc("b", "1", 10)]);
        assert_eq!(
            kinds(&plan),
            vec![
                (OperationKind::Create, "a:1".into()),
                (OperationKind::Delete, "b:1".into()),
            ]
        );
    }

    #[test]
    fn deletes_follow_source_operations_in_target_order() {
        let source = vec![doc("n", "3", 30), doc("n", "1", 10), doc("n", "9", 1)];
        let target = vec![
            doc("n", "5", 1),
            doc("n", "1", 5),
            doc("n", "4", 1),
            doc("n", "3", 30),
        ];
        let plan = plan(&source, &target);
        assert_eq!(
            kinds(&plan),
            vec![
                (OperationKind::Skip, "n:3".into()),
                (OperationKind::Update, "n:1".into()),
                (OperationKind::Create, "n:9".into()),
                (OperationKind::Delete, "n:5".into()),
                (OperationKind::Delete, "n:4".into()),
            ]
        );
    }

    #[test]
    fn source_ids_containing_delimiter_match() {
        let plan = plan(
            &[doc("github", "dir/file:v1.md", 20)],
            &[doc("github", "dir/file:v1.md", 10)],
        );
        assert_eq!(
            kinds(&plan),
            vec![(OperationKind::Update, "github:dir/file:v1.md".into())]
        );
    }

    #[test]
    fn summary_matches_operations_for_mixed_inputs() {
        let source: Vec<_> = (0..40)
            .map(|i| doc(if i % 3 == 0 { "a" } else { "b" }, &i.to_string(), i))
            .collect();
        let target: Vec<_> = (20..60)
            .map(|i| doc(if i % 2 == 0 { "a" } else { "b" }, &i.to_string(), 30))
            .collect();
        let plan = plan(&source, &target);
        let s = plan.summary();
        assert_eq!(s.total, plan.operations().len());
        assert_eq!(s.total, s.create + s.update + s.delete + s.skip);
        for kind in [
            OperationKind::Create,
            OperationKind::Update,
            OperationKind::Delete,
            OperationKind::Skip,
        ] {
            assert_eq!(s.count(kind), plan.operations_of(kind).count());
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let source = vec![doc("n", "1", 10), doc("n", "2", 20)];
        let target = vec![doc("n", "2", 10), doc("n", "3", 10)];
        assert_eq!(plan(&source, &target), plan(&source, &target));
    }
}
