use anyhow::Context;
use async_trait::async_trait;
use mise_db::models::{
    IndexableType, MealPlan, MealPlanGroceryListItem, MealPlanStatus, MealPlanTask,
    NewGroceryListItem, NewMealPlanTask, Recipe,
};
use mise_db::queries::meal_plans::FinalizedMealPlanResult;
use mise_db::queries::{grocery_list_items, meal_plan_tasks, meal_plans, recipes, search_index};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::DataStore;
use crate::election;
use crate::error::StoreError;

/// [`DataStore`] over the `mise-db` schema.
#[derive(Debug, Clone)]
pub struct PgDataStore {
    pool: PgPool,
}

impl PgDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn get_unfinalized_meal_plans_with_expired_voting_periods(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError> {
        Ok(meal_plans::list_expired_open_meal_plans(&self.pool).await?)
    }

    async fn attempt_to_finalize_meal_plan(
        &self,
        meal_plan_id: Uuid,
        household_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let Some(mut plan) =
            meal_plans::lock_finalizable_meal_plan(&mut tx, meal_plan_id, household_id).await?
        else {
            debug!(meal_plan_id = %meal_plan_id, "meal plan no longer finalizable");
            return Ok(false);
        };
        meal_plans::load_events_with_votes(&mut tx, &mut plan).await?;

        for decision in election::decide_meal_plan(&plan) {
            match decision.outcome {
                Some(outcome) => {
                    meal_plans::mark_option_chosen(&mut tx, outcome.winner, outcome.tiebroken)
                        .await?;
                    debug!(
                        meal_plan_event_id = %decision.meal_plan_event_id,
                        meal_plan_option_id = %outcome.winner,
                        tiebroken = outcome.tiebroken,
                        rounds = outcome.rounds,
                        "option chosen"
                    );
                }
                None => info!(
                    meal_plan_id = %meal_plan_id,
                    meal_plan_event_id = %decision.meal_plan_event_id,
                    "no votes cast for event, leaving it without a chosen option"
                ),
            }
        }

        meal_plans::set_meal_plan_status(&mut tx, meal_plan_id, MealPlanStatus::Finalized).await?;
        tx.commit()
            .await
            .context("failed to commit meal plan finalization")?;
        Ok(true)
    }

    async fn get_finalized_meal_plans_with_uninitialized_grocery_lists(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError> {
        let mut plans = meal_plans::list_finalized_without_grocery_list(&self.pool).await?;
        if plans.is_empty() {
            return Ok(plans);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection")?;
        for plan in &mut plans {
            meal_plans::load_events_with_votes(&mut conn, plan).await?;
            meal_plans::load_chosen_meals(&mut conn, plan).await?;
        }
        Ok(plans)
    }

    async fn create_meal_plan_grocery_list_item(
        &self,
        input: &NewGroceryListItem,
    ) -> Result<MealPlanGroceryListItem, StoreError> {
        Ok(grocery_list_items::insert_grocery_list_item(&self.pool, input).await?)
    }

    async fn mark_meal_plan_grocery_list_as_initialized(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError> {
        Ok(meal_plans::mark_grocery_list_initialized(&self.pool, meal_plan_id).await?)
    }

    async fn get_finalized_meal_plan_ids_for_the_next_week(
        &self,
    ) -> Result<Vec<FinalizedMealPlanResult>, StoreError> {
        Ok(meal_plans::list_finalized_meal_plan_ids_for_next_week(&self.pool).await?)
    }

    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Recipe, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection")?;
        recipes::get_recipe(&mut conn, recipe_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "recipe",
                id: recipe_id,
            })
    }

    async fn create_meal_plan_tasks_for_meal_plan_option(
        &self,
        inputs: &[NewMealPlanTask],
    ) -> Result<Vec<MealPlanTask>, StoreError> {
        Ok(meal_plan_tasks::insert_meal_plan_tasks(&self.pool, inputs).await?)
    }

    async fn mark_meal_plan_as_having_tasks_created(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError> {
        Ok(meal_plans::mark_tasks_created(&self.pool, meal_plan_id).await?)
    }

    async fn get_ids_needing_indexing(
        &self,
        kind: IndexableType,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(search_index::list_ids_needing_indexing(&self.pool, kind).await?)
    }
}
