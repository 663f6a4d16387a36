use async_trait::async_trait;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{WorkContext, Worker, WorkerDeps};
use crate::error::{MultiError, WorkerError};
use crate::grocery::aggregate_grocery_list;
use crate::publish::DataChangeMessage;

/// Writes the grocery list of every finalized plan that lacks one.
pub struct GroceryInitWorker {
    deps: WorkerDeps,
}

impl GroceryInitWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self { deps }
    }

    /// Initialize grocery lists. Returns the number of items written.
    ///
    /// A plan is marked initialized only when every one of its items was
    /// stored; otherwise it is retried on the next sweep, and the
    /// (plan, ingredient, unit) uniqueness keeps already-stored items from
    /// being duplicated.
    pub async fn initialize_grocery_lists(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        self.sweep(ctx).instrument(info_span!("grocery_init")).await
    }

    async fn sweep(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        let store = &self.deps.store;

        let Some(plans) = ctx
            .run(store.get_finalized_meal_plans_with_uninitialized_grocery_lists())
            .await
        else {
            info!("cancelled before listing meal plans");
            return Ok(0);
        };
        let plans = plans.inspect_err(|err| {
            error!(error = %err, "failed to list meal plans without grocery lists");
        })?;

        let mut created = 0u64;
        let mut errors = MultiError::new();

        'plans: for plan in &plans {
            let inputs = aggregate_grocery_list(plan);
            debug!(meal_plan_id = %plan.id, items = inputs.len(), "aggregated grocery list");

            let mut plan_failed = false;
            for input in &inputs {
                let Some(result) = ctx.run(store.create_meal_plan_grocery_list_item(input)).await
                else {
                    info!(created, "cancelled, stopping grocery sweep");
                    break 'plans;
                };

                match result {
                    Ok(item) => {
                        created += 1;
                        self.deps.metrics.grocery_list_items_created.add(1);

                        let message = match DataChangeMessage::grocery_list_item_created(
                            &item,
                            plan.belongs_to_household,
                        ) {
                            Ok(message) => message,
                            Err(err) => {
                                self.deps.metrics.publish_failures.add(1);
                                error!(
                                    meal_plan_grocery_list_item_id = %item.id,
                                    error = %err,
                                    "failed to build grocery list item message"
                                );
                                continue;
                            }
                        };
                        if ctx
                            .run(self.deps.publish(&self.deps.topics.data_changes, &message))
                            .await
                            .is_none()
                        {
                            info!(created, "cancelled, stopping grocery sweep");
                            break 'plans;
                        }
                    }
                    Err(err) => {
                        plan_failed = true;
                        error!(
                            meal_plan_id = %plan.id,
                            valid_ingredient_id = %input.valid_ingredient_id,
                            error = %err,
                            "failed to create grocery list item"
                        );
                        if errors.push(err).is_break() {
                            break 'plans;
                        }
                    }
                }
            }

            if plan_failed {
                warn!(
                    meal_plan_id = %plan.id,
                    "grocery list incomplete, leaving it uninitialized for the next sweep"
                );
                continue;
            }

            let Some(result) = ctx
                .run(store.mark_meal_plan_grocery_list_as_initialized(plan.id))
                .await
            else {
                info!(created, "cancelled, stopping grocery sweep");
                break;
            };
            match result {
                Ok(()) => info!(
                    meal_plan_id = %plan.id,
                    items = inputs.len(),
                    "grocery list initialized"
                ),
                Err(err) => {
                    error!(
                        meal_plan_id = %plan.id,
                        error = %err,
                        "failed to mark grocery list as initialized"
                    );
                    if errors.push(err).is_break() {
                        break;
                    }
                }
            }
        }

        info!(created, failed = errors.len(), "grocery sweep complete");
        errors.into_result()?;
        Ok(created)
    }
}

#[async_trait]
impl Worker for GroceryInitWorker {
    fn name(&self) -> &'static str {
        "grocery_init"
    }

    async fn work(&self, ctx: &WorkContext) -> Result<Option<u64>, WorkerError> {
        self.initialize_grocery_lists(ctx).await.map(|_| None)
    }
}
