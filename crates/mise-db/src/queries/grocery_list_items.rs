//! Database query functions for the `meal_plan_grocery_list_items` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MealPlanGroceryListItem, NewGroceryListItem};

/// Insert a grocery list item, or return the existing row for the same
/// (plan, ingredient, unit).
///
/// Repeated calls with the same key return the same row; the first write wins.
pub async fn insert_grocery_list_item(
    pool: &PgPool,
    input: &NewGroceryListItem,
) -> Result<MealPlanGroceryListItem> {
    let inserted = sqlx::query_as::<_, MealPlanGroceryListItem>(
        "INSERT INTO meal_plan_grocery_list_items \
             (belongs_to_meal_plan, valid_ingredient_id, valid_measurement_unit_id, \
              minimum_quantity_needed, maximum_quantity_needed, status, status_explanation) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (belongs_to_meal_plan, valid_ingredient_id, valid_measurement_unit_id) \
         DO NOTHING \
         RETURNING *",
    )
    .bind(input.belongs_to_meal_plan)
    .bind(input.valid_ingredient_id)
    .bind(input.valid_measurement_unit_id)
    .bind(input.minimum_quantity_needed)
    .bind(input.maximum_quantity_needed)
    .bind(input.status)
    .bind(&input.status_explanation)
    .fetch_optional(pool)
    .await
    .context("failed to insert grocery list item")?;

    if let Some(item) = inserted {
        return Ok(item);
    }

    let existing = sqlx::query_as::<_, MealPlanGroceryListItem>(
        "SELECT * FROM meal_plan_grocery_list_items \
         WHERE belongs_to_meal_plan = $1 \
           AND valid_ingredient_id = $2 AND valid_measurement_unit_id = $3",
    )
    .bind(input.belongs_to_meal_plan)
    .bind(input.valid_ingredient_id)
    .bind(input.valid_measurement_unit_id)
    .fetch_one(pool)
    .await
    .context("failed to fetch existing grocery list item")?;

    Ok(existing)
}

/// List the grocery list of a plan ordered by ingredient then unit.
pub async fn list_for_meal_plan(
    pool: &PgPool,
    meal_plan_id: Uuid,
) -> Result<Vec<MealPlanGroceryListItem>> {
    let items = sqlx::query_as::<_, MealPlanGroceryListItem>(
        "SELECT * FROM meal_plan_grocery_list_items \
         WHERE belongs_to_meal_plan = $1 AND archived_at IS NULL \
         ORDER BY valid_ingredient_id ASC, valid_measurement_unit_id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list grocery list items")?;

    Ok(items)
}
