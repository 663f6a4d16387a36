//! Database query functions for `meal_plans` and the event/option/vote tree
//! beneath it.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{
    MealPlan, MealPlanEvent, MealPlanOption, MealPlanOptionVote, MealPlanStatus, Recipe,
};
use crate::queries::recipes;

/// One chosen option of a finalized plan whose event starts within the next
/// week, with the recipes of the option's meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FinalizedMealPlanResult {
    pub meal_plan_id: Uuid,
    pub meal_plan_event_id: Uuid,
    pub meal_plan_option_id: Uuid,
    pub meal_id: Uuid,
    pub recipe_ids: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// List open, unarchived plans whose voting deadline has passed.
pub async fn list_expired_open_meal_plans(pool: &PgPool) -> Result<Vec<MealPlan>> {
    let plans = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans \
         WHERE status = 'open' AND archived_at IS NULL AND voting_deadline < NOW() \
         ORDER BY voting_deadline ASC, id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list expired meal plans")?;

    Ok(plans)
}

/// Lock a plan row for finalization.
///
/// Returns `None` when the plan does not exist, belongs to another household,
/// or is no longer open with an expired deadline. Must run inside a
/// transaction; the row lock is held until it ends.
pub async fn lock_finalizable_meal_plan(
    conn: &mut PgConnection,
    id: Uuid,
    household_id: Uuid,
) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans \
         WHERE id = $1 AND belongs_to_household = $2 \
           AND status = 'open' AND archived_at IS NULL AND voting_deadline < NOW() \
         FOR UPDATE",
    )
    .bind(id)
    .bind(household_id)
    .fetch_optional(&mut *conn)
    .await
    .context("failed to lock meal plan")?;

    Ok(plan)
}

/// Fetch a plan by ID without its children.
pub async fn get_meal_plan(pool: &PgPool, id: Uuid) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>("SELECT * FROM meal_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal plan")?;

    Ok(plan)
}

/// Populate `plan.events`, each event's options, and each option's votes.
pub async fn load_events_with_votes(conn: &mut PgConnection, plan: &mut MealPlan) -> Result<()> {
    let mut events = sqlx::query_as::<_, MealPlanEvent>(
        "SELECT * FROM meal_plan_events \
         WHERE belongs_to_meal_plan = $1 AND archived_at IS NULL \
         ORDER BY starts_at ASC, id ASC",
    )
    .bind(plan.id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch meal plan events")?;

    let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
    let mut options = sqlx::query_as::<_, MealPlanOption>(
        "SELECT * FROM meal_plan_options \
         WHERE belongs_to_meal_plan_event = ANY($1) AND archived_at IS NULL \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(&event_ids)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch meal plan options")?;

    let option_ids: Vec<Uuid> = options.iter().map(|o| o.id).collect();
    let votes = sqlx::query_as::<_, MealPlanOptionVote>(
        "SELECT * FROM meal_plan_option_votes \
         WHERE belongs_to_meal_plan_option = ANY($1) AND archived_at IS NULL \
         ORDER BY by_user ASC, rank ASC, id ASC",
    )
    .bind(&option_ids)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch meal plan option votes")?;

    let mut votes_by_option: HashMap<Uuid, Vec<MealPlanOptionVote>> = HashMap::new();
    for vote in votes {
        votes_by_option
            .entry(vote.belongs_to_meal_plan_option)
            .or_default()
            .push(vote);
    }
    for option in &mut options {
        option.votes = votes_by_option.remove(&option.id).unwrap_or_default();
    }

    let mut options_by_event: HashMap<Uuid, Vec<MealPlanOption>> = HashMap::new();
    for option in options {
        options_by_event
            .entry(option.belongs_to_meal_plan_event)
            .or_default()
            .push(option);
    }
    for event in &mut events {
        event.options = options_by_event.remove(&event.id).unwrap_or_default();
    }

    plan.events = events;
    Ok(())
}

/// Mark an option as the winner of its event.
pub async fn mark_option_chosen(
    conn: &mut PgConnection,
    option_id: Uuid,
    tiebroken: bool,
) -> Result<()> {
    let result =
        sqlx::query("UPDATE meal_plan_options SET chosen = TRUE, tiebroken = $2 WHERE id = $1")
            .bind(option_id)
            .bind(tiebroken)
            .execute(&mut *conn)
            .await
            .context("failed to mark meal plan option as chosen")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("meal plan option {option_id} not found");
    }

    Ok(())
}

/// Update the status of a plan.
pub async fn set_meal_plan_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: MealPlanStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE meal_plans SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("failed to update meal plan status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("meal plan {id} not found");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Grocery lists
// ---------------------------------------------------------------------------

/// List finalized plans whose grocery list has not been initialized yet.
/// Children are not loaded.
pub async fn list_finalized_without_grocery_list(pool: &PgPool) -> Result<Vec<MealPlan>> {
    let plans = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans \
         WHERE status = 'finalized' AND archived_at IS NULL \
           AND grocery_list_initialized = FALSE \
         ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list meal plans without grocery lists")?;

    Ok(plans)
}

/// Attach the meal, components and recipes to every chosen option of an
/// already-loaded plan. Each recipe is fetched once per plan.
///
/// Missing meals or recipes are left as `None`; the aggregator skips them.
pub async fn load_chosen_meals(conn: &mut PgConnection, plan: &mut MealPlan) -> Result<()> {
    let mut recipe_cache: HashMap<Uuid, Option<Recipe>> = HashMap::new();

    for event in &mut plan.events {
        for option in event.options.iter_mut().filter(|o| o.chosen) {
            let Some(mut meal) = recipes::get_meal(&mut *conn, option.meal_id).await? else {
                continue;
            };
            for component in &mut meal.components {
                if !recipe_cache.contains_key(&component.recipe_id) {
                    let recipe = recipes::get_recipe(&mut *conn, component.recipe_id).await?;
                    recipe_cache.insert(component.recipe_id, recipe);
                }
                component.recipe = recipe_cache.get(&component.recipe_id).cloned().flatten();
            }
            option.meal = Some(meal);
        }
    }

    Ok(())
}

/// Set `grocery_list_initialized` on a plan.
pub async fn mark_grocery_list_initialized(pool: &PgPool, id: Uuid) -> Result<()> {
    let result =
        sqlx::query("UPDATE meal_plans SET grocery_list_initialized = TRUE WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to mark grocery list as initialized")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("meal plan {id} not found");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Task creation
// ---------------------------------------------------------------------------

/// List chosen options of finalized plans without tasks whose event starts
/// in `[now, now + 7 days)`, with the recipe IDs of each option's meal.
///
/// Rows are grouped by plan so callers can accumulate per plan in one pass.
pub async fn list_finalized_meal_plan_ids_for_next_week(
    pool: &PgPool,
) -> Result<Vec<FinalizedMealPlanResult>> {
    let rows = sqlx::query_as::<_, FinalizedMealPlanResult>(
        "SELECT mp.id AS meal_plan_id, \
                mpe.id AS meal_plan_event_id, \
                mpo.id AS meal_plan_option_id, \
                mpo.meal_id AS meal_id, \
                array_agg(mc.recipe_id ORDER BY mc.created_at, mc.id) AS recipe_ids \
         FROM meal_plan_options mpo \
         JOIN meal_plan_events mpe ON mpe.id = mpo.belongs_to_meal_plan_event \
         JOIN meal_plans mp ON mp.id = mpe.belongs_to_meal_plan \
         JOIN meal_components mc ON mc.belongs_to_meal = mpo.meal_id AND mc.archived_at IS NULL \
         WHERE mp.status = 'finalized' AND mp.archived_at IS NULL AND mp.tasks_created = FALSE \
           AND mpo.chosen AND mpo.archived_at IS NULL AND mpe.archived_at IS NULL \
           AND mpe.starts_at >= NOW() AND mpe.starts_at < NOW() + INTERVAL '7 days' \
         GROUP BY mp.id, mpe.id, mpo.id \
         ORDER BY mp.id ASC, mpe.starts_at ASC, mpo.id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list finalized meal plans for the next week")?;

    Ok(rows)
}

/// Set `tasks_created` on a plan.
pub async fn mark_tasks_created(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE meal_plans SET tasks_created = TRUE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark meal plan as having tasks created")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("meal plan {id} not found");
    }

    Ok(())
}
