//! Persistence seam used by the workers.

mod postgres;

pub use postgres::PgDataStore;

use async_trait::async_trait;
use mise_db::models::{
    IndexableType, MealPlan, MealPlanGroceryListItem, MealPlanTask, NewGroceryListItem,
    NewMealPlanTask, Recipe,
};
use mise_db::queries::meal_plans::FinalizedMealPlanResult;
use uuid::Uuid;

use crate::error::StoreError;

/// Domain persistence with idempotent state transitions.
///
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Open plans whose voting deadline has passed. Children are not loaded.
    async fn get_unfinalized_meal_plans_with_expired_voting_periods(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError>;

    /// Count the votes of every event and finalize the plan, atomically.
    ///
    /// Returns `false` without changing anything when the plan is no longer
    /// open with an expired deadline (for example because another sweep
    /// finalized it first).
    async fn attempt_to_finalize_meal_plan(
        &self,
        meal_plan_id: Uuid,
        household_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Finalized plans without a grocery list, with events, options and the
    /// meals and recipes of chosen options loaded.
    async fn get_finalized_meal_plans_with_uninitialized_grocery_lists(
        &self,
    ) -> Result<Vec<MealPlan>, StoreError>;

    /// Insert a grocery list item, returning the existing row if the plan
    /// already lists the same ingredient and unit.
    async fn create_meal_plan_grocery_list_item(
        &self,
        input: &NewGroceryListItem,
    ) -> Result<MealPlanGroceryListItem, StoreError>;

    async fn mark_meal_plan_grocery_list_as_initialized(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError>;

    /// Chosen options of finalized plans without tasks whose events start in
    /// the coming week.
    async fn get_finalized_meal_plan_ids_for_the_next_week(
        &self,
    ) -> Result<Vec<FinalizedMealPlanResult>, StoreError>;

    /// A recipe with steps, ingredients, products and prep tasks loaded.
    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Recipe, StoreError>;

    /// Create tasks in one call. Idempotent on (option, prep task): existing
    /// rows are returned instead of duplicated.
    async fn create_meal_plan_tasks_for_meal_plan_option(
        &self,
        inputs: &[NewMealPlanTask],
    ) -> Result<Vec<MealPlanTask>, StoreError>;

    async fn mark_meal_plan_as_having_tasks_created(
        &self,
        meal_plan_id: Uuid,
    ) -> Result<(), StoreError>;

    /// IDs of unarchived entities of `kind` never indexed or last indexed
    /// more than 24 hours ago.
    async fn get_ids_needing_indexing(&self, kind: IndexableType)
    -> Result<Vec<Uuid>, StoreError>;
}

// Compile-time check: DataStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn DataStore) {}
};
