//! In-memory collaborators for worker tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use mise_db::models::{
    GroceryListItemStatus, IndexableType, MealPlan, MealPlanGroceryListItem, MealPlanStatus,
    MealPlanTask, NewGroceryListItem, NewMealPlanTask, Recipe,
};
use mise_db::queries::meal_plans::FinalizedMealPlanResult;

use mise_core::election;
use mise_core::error::{PublishError, StoreError};
use mise_core::publish::{DataChangeMessage, Publisher};
use mise_core::store::DataStore;
use mise_core::worker::WorkerDeps;

// ===========================================================================
// Store
// ===========================================================================

/// Failures the in-memory store injects on demand.
#[derive(Debug, Default)]
pub struct Faults {
    /// Plans whose finalization fails permanently.
    pub finalize_permanent: HashSet<Uuid>,
    /// Plans whose finalization fails with a transient error.
    pub finalize_transient: HashSet<Uuid>,
    /// Ingredients whose grocery item insert fails.
    pub grocery_insert: HashSet<Uuid>,
    /// Recipes that cannot be loaded.
    pub recipe_load: HashSet<Uuid>,
    /// Number of upcoming `mark_meal_plan_as_having_tasks_created` calls
    /// that fail.
    pub mark_tasks_created: usize,
    /// Indexable types whose enumeration fails.
    pub index_enumeration: HashSet<IndexableType>,
}

#[derive(Default)]
struct State {
    plans: Vec<MealPlan>,
    recipes: HashMap<Uuid, Recipe>,
    grocery_items: Vec<MealPlanGroceryListItem>,
    tasks: Vec<MealPlanTask>,
    stale: BTreeMap<IndexableType, Vec<Uuid>>,
}

/// A [`DataStore`] over plain collections, with call counting and fault
/// injection.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

fn permanent(msg: &str) -> StoreError {
    StoreError::Permanent(anyhow::anyhow!(msg.to_owned()))
}

fn transient(msg: &str) -> StoreError {
    StoreError::Transient(anyhow::anyhow!(msg.to_owned()))
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store `plan` with its whole tree, registering every recipe its
    /// options reference.
    pub fn insert_plan(&self, plan: MealPlan) {
        let mut state = self.state();
        for option in plan.events.iter().flat_map(|e| &e.options) {
            let components = option.meal.iter().flat_map(|m| &m.components);
            for recipe in components.filter_map(|c| c.recipe.as_ref()) {
                state.recipes.insert(recipe.id, recipe.clone());
            }
        }
        state.plans.push(plan);
    }

    pub fn insert_recipe(&self, recipe: Recipe) {
        self.state().recipes.insert(recipe.id, recipe);
    }

    pub fn set_stale(&self, kind: IndexableType, ids: Vec<Uuid>) {
        self.state().stale.insert(kind, ids);
    }

    pub fn plan(&self, id: Uuid) -> MealPlan {
        self.state()
            .plans
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("plan should exist")
    }

    pub fn update_plan(&self, id: Uuid, f: impl FnOnce(&mut MealPlan)) {
        let mut state = self.state();
        let plan = state
            .plans
            .iter_mut()
            .find(|p| p.id == id)
            .expect("plan should exist");
        f(plan);
    }

    pub fn grocery_items(&self, meal_plan_id: Uuid) -> Vec<MealPlanGroceryListItem> {
        self.state()
            .grocery_items
            .iter()
            .filter(|i| i.belongs_to_meal_plan == meal_plan_id)
            .cloned()
            .collect()
    }

    pub fn tasks(&self) -> Vec<MealPlanTask> {
        self.state().tasks.clone()
    }

    pub fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().expect("faults lock")
    }

    /// How many times the named `DataStore` method was called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("state lock")
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().expect("calls lock").entry(method).or_default() += 1;
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn get_unfinalized_meal_plans_with_expired_voting_periods(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError> {
        self.record("get_unfinalized_meal_plans_with_expired_voting_periods");
        let now = Utc::now();
        Ok(self
            .state()
            .plans
            .iter()
            .filter(|p| p.status == MealPlanStatus::Open && p.voting_deadline < now)
            .map(|p| MealPlan {
                events: Vec::new(),
                ..p.clone()
            })
            .collect())
    }

    async fn attempt_to_finalize_meal_plan(
        &self,
        meal_plan_id: Uuid,
        household_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.record("attempt_to_finalize_meal_plan");
        {
            let faults = self.faults();
            if faults.finalize_transient.contains(&meal_plan_id) {
                return Err(transient("connection reset"));
            }
            if faults.finalize_permanent.contains(&meal_plan_id) {
                return Err(permanent("check constraint violated"));
            }
        }

        let mut state = self.state();
        let Some(plan) = state.plans.iter_mut().find(|p| {
            p.id == meal_plan_id
                && p.belongs_to_household == household_id
                && p.status == MealPlanStatus::Open
                && p.voting_deadline < Utc::now()
        }) else {
            return Ok(false);
        };

        let decisions = election::decide_meal_plan(plan);
        for decision in decisions {
            let Some(outcome) = decision.outcome else {
                continue;
            };
            for option in plan.events.iter_mut().flat_map(|e| e.options.iter_mut()) {
                if option.id == outcome.winner {
                    option.chosen = true;
                    option.tiebroken = outcome.tiebroken;
                }
            }
        }
        plan.status = MealPlanStatus::Finalized;
        Ok(true)
    }

    async fn get_finalized_meal_plans_with_uninitialized_grocery_lists(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError> {
        self.record("get_finalized_meal_plans_with_uninitialized_grocery_lists");
        Ok(self
            .state()
            .plans
            .iter()
            .filter(|p| p.status == MealPlanStatus::Finalized && !p.grocery_list_initialized)
            .cloned()
            .collect())
    }

    async fn create_meal_plan_grocery_list_item(
        &self,
        input: &NewGroceryListItem,
    ) -> Result<MealPlanGroceryListItem, StoreError> {
        self.record("create_meal_plan_grocery_list_item");
        if self.faults().grocery_insert.contains(&input.valid_ingredient_id) {
            return Err(permanent("grocery insert rejected"));
        }

        let mut state = self.state();
        if let Some(existing) = state.grocery_items.iter().find(|i| {
            i.belongs_to_meal_plan == input.belongs_to_meal_plan
                && i.valid_ingredient_id == input.valid_ingredient_id
                && i.valid_measurement_unit_id == input.valid_measurement_unit_id
        }) {
            return Ok(existing.clone());
        }

        let item = MealPlanGroceryListItem {
            id: Uuid::new_v4(),
            belongs_to_meal_plan: input.belongs_to_meal_plan,
            valid_ingredient_id: input.valid_ingredient_id,
            valid_measurement_unit_id: input.valid_measurement_unit_id,
            minimum_quantity_needed: input.minimum_quantity_needed,
            maximum_quantity_needed: input.maximum_quantity_needed,
            status: GroceryListItemStatus::Needs,
            status_explanation: input.status_explanation.clone(),
            created_at: Utc::now(),
        };
        state.grocery_items.push(item.clone());
        Ok(item)
    }

    async fn mark_meal_plan_grocery_list_as_initialized(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError> {
        self.record("mark_meal_plan_grocery_list_as_initialized");
        let mut state = self.state();
        if let Some(plan) = state.plans.iter_mut().find(|p| p.id == meal_plan_id) {
            plan.grocery_list_initialized = true;
        }
        Ok(())
    }

    async fn get_finalized_meal_plan_ids_for_the_next_week(
        &self,
    ) -> Result<Vec<FinalizedMealPlanResult>, StoreError> {
        self.record("get_finalized_meal_plan_ids_for_the_next_week");
        let now = Utc::now();
        let horizon = now + Duration::days(7);

        let state = self.state();
        let mut rows = Vec::new();
        for plan in &state.plans {
            if plan.status != MealPlanStatus::Finalized || plan.tasks_created {
                continue;
            }
            for event in &plan.events {
                if event.starts_at < now || event.starts_at >= horizon {
                    continue;
                }
                for option in event.options.iter().filter(|o| o.chosen) {
                    let recipe_ids = option
                        .meal
                        .iter()
                        .flat_map(|m| &m.components)
                        .map(|c| c.recipe_id)
                        .collect();
                    rows.push(FinalizedMealPlanResult {
                        meal_plan_id: plan.id,
                        meal_plan_event_id: event.id,
                        meal_plan_option_id: option.id,
                        meal_id: option.meal_id,
                        recipe_ids,
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Recipe, StoreError> {
        self.record("get_recipe");
        if self.faults().recipe_load.contains(&recipe_id) {
            return Err(permanent("recipe row could not be decoded"));
        }
        self.state()
            .recipes
            .get(&recipe_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "recipe",
                id: recipe_id,
            })
    }

    async fn create_meal_plan_tasks_for_meal_plan_option(
        &self,
        inputs: &[NewMealPlanTask],
    ) -> Result<Vec<MealPlanTask>, StoreError> {
        self.record("create_meal_plan_tasks_for_meal_plan_option");
        let mut state = self.state();
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            let existing = state.tasks.iter().find(|t| {
                t.belongs_to_meal_plan_option == input.belongs_to_meal_plan_option
                    && t.belongs_to_recipe_prep_task == input.belongs_to_recipe_prep_task
            });
            let task = match existing {
                Some(task) => task.clone(),
                None => {
                    let task = MealPlanTask {
                        id: Uuid::new_v4(),
                        belongs_to_meal_plan_option: input.belongs_to_meal_plan_option,
                        belongs_to_recipe_prep_task: input.belongs_to_recipe_prep_task,
                        status: input.status,
                        status_explanation: String::new(),
                        creation_explanation: input.creation_explanation.clone(),
                        assigned_to_user: input.assigned_to_user,
                        completed_at: None,
                        created_at: Utc::now(),
                    };
                    state.tasks.push(task.clone());
                    task
                }
            };
            out.push(task);
        }
        Ok(out)
    }

    async fn mark_meal_plan_as_having_tasks_created(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError> {
        self.record("mark_meal_plan_as_having_tasks_created");
        {
            let mut faults = self.faults();
            if faults.mark_tasks_created > 0 {
                faults.mark_tasks_created -= 1;
                return Err(permanent("update rejected"));
            }
        }
        let mut state = self.state();
        if let Some(plan) = state.plans.iter_mut().find(|p| p.id == meal_plan_id) {
            plan.tasks_created = true;
        }
        Ok(())
    }

    async fn get_ids_needing_indexing(
        &self,
        kind: IndexableType,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.record("get_ids_needing_indexing");
        if self.faults().index_enumeration.contains(&kind) {
            return Err(permanent("relation does not exist"));
        }
        Ok(self.state().stale.get(&kind).cloned().unwrap_or_default())
    }
}

// ===========================================================================
// Publisher
// ===========================================================================

/// A [`Publisher`] that records accepted messages.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, DataChangeMessage)>>,
    attempts: Mutex<usize>,
    fail_all: AtomicBool,
    fail_entities: Mutex<HashSet<Uuid>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every message until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Reject messages about `entity_id`.
    pub fn fail_for(&self, entity_id: Uuid) {
        self.fail_entities
            .lock()
            .expect("fail lock")
            .insert(entity_id);
    }

    pub fn messages(&self) -> Vec<(String, DataChangeMessage)> {
        self.messages.lock().expect("messages lock").clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<DataChangeMessage> {
        self.messages()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts lock")
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, message: &DataChangeMessage) -> Result<(), PublishError> {
        *self.attempts.lock().expect("attempts lock") += 1;

        let rejected = self.fail_all.load(Ordering::SeqCst)
            || self
                .fail_entities
                .lock()
                .expect("fail lock")
                .contains(&message.entity_id);
        if rejected {
            return Err(PublishError::Delivery {
                topic: topic.to_owned(),
                cause: anyhow::anyhow!("broker unavailable"),
            });
        }

        self.messages
            .lock()
            .expect("messages lock")
            .push((topic.to_owned(), message.clone()));
        Ok(())
    }
}

pub fn deps(store: &Arc<InMemoryStore>, publisher: &Arc<RecordingPublisher>) -> WorkerDeps {
    WorkerDeps::new(store.clone(), publisher.clone())
}
