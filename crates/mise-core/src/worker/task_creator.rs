use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use mise_db::models::{NewMealPlanTask, Recipe};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{WorkContext, Worker, WorkerDeps};
use crate::analyzer::RecipeAnalyzer;
use crate::error::{MultiError, WorkerError};
use crate::publish::DataChangeMessage;

/// Creates advance-prep tasks for finalized plans whose events start within
/// the coming week.
pub struct TaskCreatorWorker {
    deps: WorkerDeps,
    analyzer: RecipeAnalyzer,
}

/// Task inputs gathered for one plan.
#[derive(Default)]
struct PlanTasks {
    inputs: Vec<NewMealPlanTask>,
    seen: HashSet<(Uuid, Uuid)>,
    /// A recipe could not be loaded, so the input list is incomplete.
    incomplete: bool,
}

impl PlanTasks {
    fn extend(&mut self, inputs: Vec<NewMealPlanTask>) {
        for input in inputs {
            let key = (input.belongs_to_meal_plan_option, input.belongs_to_recipe_prep_task);
            if self.seen.insert(key) {
                self.inputs.push(input);
            }
        }
    }
}

impl TaskCreatorWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            analyzer: RecipeAnalyzer::new(),
        }
    }

    /// Create meal plan tasks. Returns the number of task rows stored.
    ///
    /// A plan is flagged as having its tasks created once its whole input
    /// list is stored. A plan whose recipes could not all be loaded is left
    /// unflagged and retried; a recipe whose step graph is invalid is
    /// reported but does not hold the plan back, since retrying would fail
    /// the same way.
    pub async fn create_meal_plan_tasks(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        self.sweep(ctx).instrument(info_span!("task_creator")).await
    }

    async fn sweep(&self, ctx: &WorkContext) -> Result<u64, WorkerError> {
        let store = &self.deps.store;

        let Some(rows) = ctx
            .run(store.get_finalized_meal_plan_ids_for_the_next_week())
            .await
        else {
            info!("cancelled before listing meal plans");
            return Ok(0);
        };
        let rows = rows.inspect_err(|err| {
            error!(error = %err, "failed to list finalized meal plans for the next week");
        })?;
        if rows.is_empty() {
            debug!("no meal plans need tasks");
            return Ok(0);
        }

        let mut errors = MultiError::new();
        let mut recipes: HashMap<Uuid, Recipe> = HashMap::new();
        let mut unloadable: HashSet<Uuid> = HashSet::new();
        let mut invalid: HashSet<Uuid> = HashSet::new();
        let mut plans: BTreeMap<Uuid, PlanTasks> = BTreeMap::new();

        for row in &rows {
            let plan = plans.entry(row.meal_plan_id).or_default();

            for &recipe_id in &row.recipe_ids {
                if unloadable.contains(&recipe_id) {
                    plan.incomplete = true;
                    continue;
                }
                if !recipes.contains_key(&recipe_id) {
                    let Some(result) = ctx.run(store.get_recipe(recipe_id)).await else {
                        info!("cancelled while loading recipes");
                        return Ok(0);
                    };
                    match result {
                        Ok(recipe) => {
                            recipes.insert(recipe_id, recipe);
                        }
                        Err(err) => {
                            plan.incomplete = true;
                            unloadable.insert(recipe_id);
                            error!(
                                meal_plan_id = %row.meal_plan_id,
                                recipe_id = %recipe_id,
                                error = %err,
                                "failed to load recipe"
                            );
                            if errors.push(err).is_break() {
                                return errors.into_result().map(|()| 0);
                            }
                            continue;
                        }
                    }
                }
                let Some(recipe) = recipes.get(&recipe_id) else {
                    continue;
                };

                match self
                    .analyzer
                    .generate_tasks_for_option(row.meal_plan_option_id, recipe)
                {
                    Ok(inputs) => {
                        debug!(
                            meal_plan_option_id = %row.meal_plan_option_id,
                            recipe_id = %recipe_id,
                            tasks = inputs.len(),
                            "generated tasks"
                        );
                        plan.extend(inputs);
                    }
                    Err(err) => {
                        if invalid.insert(recipe_id) {
                            warn!(recipe_id = %recipe_id, error = %err, "skipping invalid recipe");
                            let _ = errors.push(err);
                        }
                    }
                }
            }
        }

        let mut created = 0u64;
        'plans: for (plan_id, plan) in plans {
            if plan.incomplete {
                warn!(
                    meal_plan_id = %plan_id,
                    "recipes missing, leaving tasks for the next sweep"
                );
                continue;
            }

            if !plan.inputs.is_empty() {
                let Some(result) = ctx
                    .run(store.create_meal_plan_tasks_for_meal_plan_option(&plan.inputs))
                    .await
                else {
                    info!(created, "cancelled, stopping task sweep");
                    break;
                };
                let tasks = match result {
                    Ok(tasks) => tasks,
                    Err(err) => {
                        error!(meal_plan_id = %plan_id, error = %err, "failed to create meal plan tasks");
                        if errors.push(err).is_break() {
                            break;
                        }
                        continue;
                    }
                };
                created += tasks.len() as u64;
                self.deps.metrics.meal_plan_tasks_created.add(tasks.len() as u64);

                for task in &tasks {
                    let message = match DataChangeMessage::meal_plan_task_created(task, plan_id) {
                        Ok(message) => message,
                        Err(err) => {
                            self.deps.metrics.publish_failures.add(1);
                            error!(
                                meal_plan_task_id = %task.id,
                                error = %err,
                                "failed to build meal plan task message"
                            );
                            continue;
                        }
                    };
                    if ctx
                        .run(self.deps.publish(&self.deps.topics.data_changes, &message))
                        .await
                        .is_none()
                    {
                        info!(created, "cancelled, stopping task sweep");
                        break 'plans;
                    }
                }
            }

            let Some(result) = ctx
                .run(store.mark_meal_plan_as_having_tasks_created(plan_id))
                .await
            else {
                info!(created, "cancelled, stopping task sweep");
                break;
            };
            match result {
                Ok(()) => info!(
                    meal_plan_id = %plan_id,
                    tasks = plan.inputs.len(),
                    "meal plan tasks created"
                ),
                Err(err) => {
                    error!(
                        meal_plan_id = %plan_id,
                        error = %err,
                        "failed to mark meal plan as having tasks"
                    );
                    if errors.push(err).is_break() {
                        break;
                    }
                }
            }
        }

        info!(created, failed = errors.len(), "task sweep complete");
        errors.into_result()?;
        Ok(created)
    }
}

#[async_trait]
impl Worker for TaskCreatorWorker {
    fn name(&self) -> &'static str {
        "task_creator"
    }

    async fn work(&self, ctx: &WorkContext) -> Result<Option<u64>, WorkerError> {
        self.create_meal_plan_tasks(ctx).await.map(|_| None)
    }
}
