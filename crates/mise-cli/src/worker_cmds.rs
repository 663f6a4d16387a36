//! Worker subcommands: one sweep per invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mise_core::publish::OutboxPublisher;
use mise_core::store::PgDataStore;
use mise_core::worker::{
    FinalizerWorker, GroceryInitWorker, IndexScheduler, IndexerRegistry, TaskCreatorWorker,
    WorkContext, Worker, WorkerDeps,
};
use mise_db::pool;

use crate::config::MiseConfig;

/// Which workers a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    Finalize,
    GroceryLists,
    Tasks,
    Index,
    /// Every worker in pipeline order.
    All,
}

impl Sweep {
    fn workers(self, deps: &WorkerDeps) -> Vec<Box<dyn Worker>> {
        let finalize = || Box::new(FinalizerWorker::new(deps.clone())) as Box<dyn Worker>;
        let grocery = || Box::new(GroceryInitWorker::new(deps.clone())) as Box<dyn Worker>;
        let tasks = || Box::new(TaskCreatorWorker::new(deps.clone())) as Box<dyn Worker>;
        let index = || {
            Box::new(IndexScheduler::new(deps.clone(), IndexerRegistry::default()))
                as Box<dyn Worker>
        };

        match self {
            Self::Finalize => vec![finalize()],
            Self::GroceryLists => vec![grocery()],
            Self::Tasks => vec![tasks()],
            Self::Index => vec![index()],
            Self::All => vec![finalize(), grocery(), tasks(), index()],
        }
    }
}

/// Connect, run the sweep's workers once, and report.
///
/// Ctrl-C cancels the running sweep; whatever it already committed stays
/// committed and the command still exits successfully.
pub async fn run_sweep(sweep: Sweep, config: &MiseConfig) -> Result<()> {
    let db_pool = pool::create_pool(&config.db_config).await?;
    let deps = WorkerDeps::new(
        Arc::new(PgDataStore::new(db_pool.clone())),
        Arc::new(OutboxPublisher::new(db_pool.clone())),
    )
    .with_topics(config.topics.clone());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling sweep");
                cancel.cancel();
            }
        }
    });

    let ctx = WorkContext::new(cancel);
    let result = run_workers(&sweep.workers(&deps), &ctx).await;

    for (name, value) in deps.metrics.snapshot() {
        info!(counter = name, value, "sweep metrics");
    }
    interrupt.abort();
    db_pool.close().await;
    result
}

/// Run `workers` in order, stopping at the first failure.
async fn run_workers(workers: &[Box<dyn Worker>], ctx: &WorkContext) -> Result<()> {
    for worker in workers {
        if ctx.is_cancelled() {
            info!(worker = worker.name(), "cancelled, skipping");
            continue;
        }

        match worker.work(ctx).await {
            Ok(Some(count)) => println!("{}: {count}", worker.name()),
            Ok(None) => println!("{}: done", worker.name()),
            Err(err) => {
                error!(worker = worker.name(), transient = err.is_transient(), error = %err, "worker failed");
                return Err(err).with_context(|| format!("{} failed", worker.name()));
            }
        }
    }
    Ok(())
}
