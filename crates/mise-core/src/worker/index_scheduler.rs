use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use mise_db::models::IndexableType;
use tracing::{Instrument, debug, error, info, info_span};

use super::{WorkContext, Worker, WorkerDeps};
use crate::error::{MultiError, WorkerError};
use crate::publish::DataChangeMessage;

/// What an indexer closure receives for one run.
#[derive(Clone)]
pub struct IndexJob {
    pub deps: WorkerDeps,
    pub ctx: WorkContext,
    /// Name the indexer was registered under.
    pub entity_type: String,
}

/// Outcome of one indexer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexTally {
    /// IDs reported stale by the store.
    pub found: u64,
    /// Re-index requests the broker accepted.
    pub published: u64,
    /// Re-index requests that failed to publish.
    pub failed: u64,
}

pub type IndexerFn =
    Arc<dyn Fn(IndexJob) -> BoxFuture<'static, Result<IndexTally, WorkerError>> + Send + Sync>;

/// Indexer closures keyed by entity type name, run in name order.
#[derive(Clone)]
pub struct IndexerRegistry {
    indexers: BTreeMap<String, IndexerFn>,
}

impl IndexerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            indexers: BTreeMap::new(),
        }
    }

    /// A registry with one indexer per [`IndexableType`].
    pub fn with_defaults() -> Self {
        IndexableType::ALL
            .into_iter()
            .fold(Self::new(), |registry, kind| registry.register_indexable(kind))
    }

    /// Register `indexer` under `name`, replacing any earlier one.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, indexer: F) -> Self
    where
        F: Fn(IndexJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<IndexTally, WorkerError>> + Send + 'static,
    {
        let indexer: IndexerFn = Arc::new(move |job| indexer(job).boxed());
        self.indexers.insert(name.into(), indexer);
        self
    }

    /// Register the store-backed indexer for `kind` under its table name.
    pub fn register_indexable(self, kind: IndexableType) -> Self {
        self.register(kind.table_name(), move |job| index_entities(kind, job))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indexers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }
}

impl Default for IndexerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Publish a re-index request for every stale entity of `kind`.
async fn index_entities(kind: IndexableType, job: IndexJob) -> Result<IndexTally, WorkerError> {
    let IndexJob { deps, ctx, .. } = job;

    let Some(ids) = ctx.run(deps.store.get_ids_needing_indexing(kind)).await else {
        return Ok(IndexTally::default());
    };
    let ids = ids?;

    let mut tally = IndexTally {
        found: ids.len() as u64,
        ..IndexTally::default()
    };
    for id in ids {
        let message = DataChangeMessage::search_index_requested(kind, id);
        match ctx
            .run(deps.publish(&deps.topics.search_indexing, &message))
            .await
        {
            None => break,
            Some(true) => {
                tally.published += 1;
                deps.metrics.search_index_requests_published.add(1);
            }
            Some(false) => tally.failed += 1,
        }
    }
    Ok(tally)
}

/// Asks every registered indexer to request re-indexing of stale entities.
pub struct IndexScheduler {
    deps: WorkerDeps,
    registry: IndexerRegistry,
}

impl IndexScheduler {
    pub fn new(deps: WorkerDeps, registry: IndexerRegistry) -> Self {
        Self { deps, registry }
    }

    /// Run every indexer once. Returns the number of requests published.
    ///
    /// A failing indexer does not stop the others unless its error is
    /// transient.
    pub async fn index_types(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        self.sweep(ctx).instrument(info_span!("index_scheduler")).await
    }

    async fn sweep(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        let mut total = IndexTally::default();
        let mut errors = MultiError::new();

        for (name, indexer) in &self.registry.indexers {
            if ctx.is_cancelled() {
                info!(published = total.published, "cancelled, stopping index sweep");
                break;
            }

            let job = IndexJob {
                deps: self.deps.clone(),
                ctx: ctx.clone(),
                entity_type: name.clone(),
            };
            match indexer(job).await {
                Ok(tally) => {
                    debug!(
                        entity_type = %name,
                        found = tally.found,
                        published = tally.published,
                        failed = tally.failed,
                        "indexer finished"
                    );
                    total.found += tally.found;
                    total.published += tally.published;
                    total.failed += tally.failed;
                }
                Err(err) => {
                    error!(entity_type = %name, error = %err, "indexer failed");
                    if errors.push(err).is_break() {
                        break;
                    }
                }
            }
        }

        info!(
            found = total.found,
            published = total.published,
            failed = total.failed,
            "index sweep complete"
        );
        errors.into_result()?;
        Ok(total.published)
    }
}

#[async_trait]
impl Worker for IndexScheduler {
    fn name(&self) -> &'static str {
        "index_scheduler"
    }

    async fn work(&self, ctx: &WorkContext) -> Result<Option<u64>, WorkerError> {
        self.index_types(ctx).await.map(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_indexable_type() {
        let registry = IndexerRegistry::default();
        assert_eq!(registry.len(), IndexableType::ALL.len());
        let names: Vec<&str> = registry.names().collect();
        assert!(names.contains(&"recipes"));
        assert!(names.contains(&"valid_ingredients"));
    }

    #[test]
    fn register_replaces_same_name() {
        let registry = IndexerRegistry::new()
            .register("recipes", |_job| async { Ok(IndexTally::default()) })
            .register("recipes", |_job| async {
                Ok(IndexTally {
                    found: 1,
                    ..IndexTally::default()
                })
            });
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
