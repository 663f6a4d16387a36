use async_trait::async_trait;
use tracing::{Instrument, debug, error, info, info_span};

use super::{WorkContext, Worker, WorkerDeps};
use crate::error::{MultiError, WorkerError};
use crate::publish::DataChangeMessage;

/// Closes open meal plans whose voting period has ended.
pub struct FinalizerWorker {
    deps: WorkerDeps,
}

impl FinalizerWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self { deps }
    }

    /// Finalize every plan that is currently eligible. Returns the number of
    /// plans this sweep moved to `finalized`.
    ///
    /// Each plan is finalized in its own transaction, so plans finalized
    /// before a failure stay finalized. A failed `meal_plan_finalized`
    /// publish is logged and the plan stays finalized.
    pub async fn finalize_expired_meal_plans(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        self.sweep(ctx).instrument(info_span!("finalizer")).await
    }

    async fn sweep(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        let store = &self.deps.store;

        let Some(plans) = ctx
            .run(store.get_unfinalized_meal_plans_with_expired_voting_periods())
            .await
        else {
            info!("cancelled before listing meal plans");
            return Ok(0);
        };
        let plans = plans.inspect_err(|err| {
            error!(error = %err, "failed to list meal plans with expired voting periods");
        })?;
        debug!(candidates = plans.len(), "meal plans with expired voting periods");

        let mut finalized = 0u64;
        let mut errors = MultiError::new();

        for plan in &plans {
            let Some(result) = ctx
                .run(store.attempt_to_finalize_meal_plan(plan.id, plan.belongs_to_household))
                .await
            else {
                info!(finalized, "cancelled, stopping finalization sweep");
                break;
            };

            match result {
                Ok(true) => {
                    finalized += 1;
                    self.deps.metrics.finalized_meal_plans.add(1);
                    info!(
                        meal_plan_id = %plan.id,
                        household_id = %plan.belongs_to_household,
                        "meal plan finalized"
                    );

                    let message =
                        DataChangeMessage::meal_plan_finalized(plan.id, plan.belongs_to_household);
                    if ctx
                        .run(self.deps.publish(&self.deps.topics.data_changes, &message))
                        .await
                        .is_none()
                    {
                        info!(finalized, "cancelled, stopping finalization sweep");
                        break;
                    }
                }
                Ok(false) => {
                    debug!(meal_plan_id = %plan.id, "meal plan was already handled");
                }
                Err(err) => {
                    error!(meal_plan_id = %plan.id, error = %err, "failed to finalize meal plan");
                    if errors.push(err).is_break() {
                        break;
                    }
                }
            }
        }

        info!(finalized, failed = errors.len(), "finalization sweep complete");
        errors.into_result()?;
        Ok(finalized)
    }
}

#[async_trait]
impl Worker for FinalizerWorker {
    fn name(&self) -> &'static str {
        "finalizer"
    }

    async fn work(&self, ctx: &WorkContext) -> Result<Option<u64>, WorkerError> {
        self.finalize_expired_meal_plans(ctx).await.map(Some)
    }
}
