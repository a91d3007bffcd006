//! Metadata fetching.
//!
//! Pulls the desired state from every source connector and the current state
//! from one target. Any connector failure is returned as
//! [`SyncError::MetadataFetch`] and no partial listing is ever returned.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use crate::error::{Side, SyncError};
use crate::logging::{fields, SyncLogger};
use crate::models::DocumentMetadata;
use crate::traits::{MetadataListing, SourceConnector, TargetConnector};

/// Flatten the listings of all `sources`, in connector order.
pub async fn fetch_source_metadata(
    sources: &[Arc<dyn SourceConnector>],
    logger: &dyn SyncLogger,
) -> Result<Vec<DocumentMetadata>, SyncError> {
    let mut all = Vec::new();

    for source in sources {
        let provider = source.provider_id();
        let listing = source
            .fetch_documents_metadata()
            .await
            .map_err(|e| SyncError::metadata(Side::Source, provider, e))?;

        let before = all.len();
        match listing {
            MetadataListing::List(items) => all.extend(items),
            MetadataListing::Stream(mut stream) => {
                while let Some(item) = stream.next().await {
                    all.push(item.map_err(|e| SyncError::metadata(Side::Source, provider, e))?);
                }
            }
        }

        logger.debug(
            "Fetched source metadata",
            &fields(json!({ "providerId": provider, "documents": all.len() - before })),
        );
    }

    logger.info(
        "Fetched metadata from all sources",
        &fields(json!({ "sources": sources.len(), "documents": all.len() })),
    );
    Ok(all)
}

/// Current listing of one target.
pub async fn fetch_target_metadata(
    target: &dyn TargetConnector,
    logger: &dyn SyncLogger,
) -> Result<Vec<DocumentMetadata>, SyncError> {
    let items = target
        .fetch_documents_metadata()
        .await
        .map_err(|e| SyncError::metadata(Side::Target, target.name(), e))?;

    logger.info(
        "Fetched target metadata",
        &fields(json!({ "target": target.name(), "documents": items.len() })),
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoopLogger;
    use crate::staging::Staging;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::{Path, PathBuf};

    enum Mode {
        List,
        Stream,
        Fail,
        FailMidStream,
    }

    struct FakeSource {
        id: &'static str,
        count: usize,
        mode: Mode,
    }

    impl FakeSource {
        fn items(&self) -> Vec<DocumentMetadata> {
            (0..self.count)
                .map(|i| DocumentMetadata::new(self.id, i.to_string(), "t", Utc::now()))
                .collect()
        }
    }

    #[async_trait]
    impl SourceConnector for FakeSource {
        fn provider_id(&self) -> &str {
            self.id
        }

        async fn fetch_documents_metadata(&self) -> Result<MetadataListing> {
            let items = self.items();
            match self.mode {
                Mode::List => Ok(items.into()),
                Mode::Stream => Ok(MetadataListing::Stream(
                    futures::stream::iter(items.into_iter().map(Ok)).boxed(),
                )),
                Mode::FailMidStream => {
                    let mut results: Vec<Result<DocumentMetadata>> =
                        items.into_iter().map(Ok).collect();
                    results.push(Err(anyhow!("page 2 failed")));
                    Ok(MetadataListing::Stream(futures::stream::iter(results).boxed()))
                }
                Mode::Fail => Err(anyhow!("listing refused")),
            }
        }

        async fn download_document_content(&self, _id: &str, _s: &Staging) -> Result<PathBuf> {
            Err(anyhow!("not used"))
        }
    }

    struct FakeTarget(Result<Vec<DocumentMetadata>, &'static str>);

    #[async_trait]
    impl TargetConnector for FakeTarget {
        fn name(&self) -> &str {
            "fake"
        }
        async fn fetch_documents_metadata(&self) -> Result<Vec<DocumentMetadata>> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
        async fn create_document_from_file(&self, _: &DocumentMetadata, _: &Path) -> Result<()> {
            Ok(())
        }
        async fn update_document_from_file(&self, _: &DocumentMetadata, _: &Path) -> Result<()> {
            Ok(())
        }
        async fn delete_document(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn src(id: &'static str, count: usize, mode: Mode) -> Arc<dyn SourceConnector> {
        Arc::new(FakeSource { id, count, mode })
    }

    #[tokio::test]
    async fn drains_lists_and_streams_uniformly() {
        let sources = vec![src("a", 2, Mode::List), src("b", 3, Mode::Stream)];
        let docs = fetch_source_metadata(&sources, &NoopLogger).await.unwrap();
        let ids: Vec<String> = docs.iter().map(|d| d.document_id()).collect();
        assert_eq!(ids, vec!["a:0", "a:1", "b:0", "b:1", "b:2"]);
    }

    #[tokio::test]
    async fn no_sources_yields_empty_listing() {
        let docs = fetch_source_metadata(&[], &NoopLogger).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn connector_failure_propagates() {
        let sources = vec![src("a", 2, Mode::List), src("b", 0, Mode::Fail)];
        let err = fetch_source_metadata(&sources, &NoopLogger).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::MetadataFetch { side: Side::Source, ref connector, .. } if connector == "b"
        ));
        assert!(err.to_string().contains("listing refused"));
    }

    #[tokio::test]
    async fn stream_item_failure_propagates() {
        let sources = vec![src("a", 2, Mode::FailMidStream)];
        let err = fetch_source_metadata(&sources, &NoopLogger).await.unwrap_err();
        assert!(err.to_string().contains("page 2 failed"));
    }

    #[tokio::test]
    async fn target_listing_and_failure() {
        let docs = vec![DocumentMetadata::new("a", "1", "t", Utc::now())];
        let ok = fetch_target_metadata(&FakeTarget(Ok(docs.clone())), &NoopLogger)
            .await
            .unwrap();
        assert_eq!(ok, docs);

        let err = fetch_target_metadata(&FakeTarget(Err("down")), &NoopLogger)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MetadataFetch { side: Side::Target, .. }));
    }
}
