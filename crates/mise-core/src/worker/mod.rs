//! Background workers and the plumbing they share.
//!
//! A worker sweep asks the store for pending work, handles each item in
//! turn, and returns. Nothing is kept between sweeps beyond what was
//! persisted. Error handling is the same everywhere:
//!
//! - a transient store error stops the sweep;
//! - permanent store errors and invalid recipes are gathered and the sweep
//!   moves on to the next item;
//! - publish failures are logged and counted but never block or undo a
//!   persisted change.
//!
//! Cancellation is not an error: a cancelled sweep returns what it finished.

mod finalizer;
mod grocery_init;
mod index_scheduler;
mod task_creator;

pub use finalizer::FinalizerWorker;
pub use grocery_init::GroceryInitWorker;
pub use index_scheduler::{IndexJob, IndexScheduler, IndexTally, IndexerFn, IndexerRegistry};
pub use task_creator::TaskCreatorWorker;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::WorkerError;
use crate::metrics::Metrics;
use crate::publish::{DataChangeMessage, Publisher, Topics};
use crate::store::DataStore;

/// Per-invocation context carrying the cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
    cancel: CancellationToken,
}

impl WorkContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` to completion unless the context is cancelled first, in
    /// which case `fut` is dropped at its current suspension point and
    /// `None` is returned.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

/// A unit of background work invoked by an external scheduler.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one sweep. Workers that count what they transitioned return
    /// `Some(count)`; the others return `None`.
    async fn work(&self, ctx: &WorkContext) -> Result<Option<u64>, WorkerError>;
}

// Compile-time check: Worker must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Worker) {}
};

/// Handles injected into every worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn DataStore>,
    pub publisher: Arc<dyn Publisher>,
    pub metrics: Arc<Metrics>,
    pub topics: Topics,
}

impl WorkerDeps {
    pub fn new(store: Arc<dyn DataStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            publisher,
            metrics: Arc::new(Metrics::new()),
            topics: Topics::default(),
        }
    }

    pub fn with_topics(mut self, topics: Topics) -> Self {
        self.topics = topics;
        self
    }

    /// Publish `message`, logging and counting a failure. Returns whether
    /// the broker accepted it.
    pub(crate) async fn publish(&self, topic: &str, message: &DataChangeMessage) -> bool {
        match self.publisher.publish(topic, message).await {
            Ok(()) => true,
            Err(err) => {
                self.metrics.publish_failures.add(1);
                error!(
                    topic,
                    event_type = %message.event_type,
                    entity_id = %message.entity_id,
                    error = %err,
                    "failed to publish data change message"
                );
                false
            }
        }
    }
}
