//! Database query functions for the `meal_plan_tasks` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MealPlanTask, NewMealPlanTask};

/// Insert a batch of tasks in one transaction.
///
/// Inputs whose (option, prep task) pair already exists are not inserted
/// again; the existing row is returned in their place, so the output always
/// has one row per input, in input order.
pub async fn insert_meal_plan_tasks(
    pool: &PgPool,
    inputs: &[NewMealPlanTask],
) -> Result<Vec<MealPlanTask>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let mut tasks = Vec::with_capacity(inputs.len());

    for input in inputs {
        let inserted = sqlx::query_as::<_, MealPlanTask>(
            "INSERT INTO meal_plan_tasks \
                 (belongs_to_meal_plan_option, belongs_to_recipe_prep_task, status, \
                  creation_explanation, assigned_to_user) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (belongs_to_meal_plan_option, belongs_to_recipe_prep_task) DO NOTHING \
             RETURNING *",
        )
        .bind(input.belongs_to_meal_plan_option)
        .bind(input.belongs_to_recipe_prep_task)
        .bind(input.status)
        .bind(&input.creation_explanation)
        .bind(input.assigned_to_user)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert meal plan task")?;

        let task = match inserted {
            Some(task) => task,
            None => sqlx::query_as::<_, MealPlanTask>(
                "SELECT * FROM meal_plan_tasks \
                 WHERE belongs_to_meal_plan_option = $1 AND belongs_to_recipe_prep_task = $2",
            )
            .bind(input.belongs_to_meal_plan_option)
            .bind(input.belongs_to_recipe_prep_task)
            .fetch_one(&mut *tx)
            .await
            .context("failed to fetch existing meal plan task")?,
        };
        tasks.push(task);
    }

    tx.commit().await.context("failed to commit meal plan tasks")?;
    Ok(tasks)
}

/// List every task attached to any option of a plan.
pub async fn list_for_meal_plan(pool: &PgPool, meal_plan_id: Uuid) -> Result<Vec<MealPlanTask>> {
    let tasks = sqlx::query_as::<_, MealPlanTask>(
        "SELECT mpt.* FROM meal_plan_tasks mpt \
         JOIN meal_plan_options mpo ON mpo.id = mpt.belongs_to_meal_plan_option \
         JOIN meal_plan_events mpe ON mpe.id = mpo.belongs_to_meal_plan_event \
         WHERE mpe.belongs_to_meal_plan = $1 \
         ORDER BY mpt.created_at ASC, mpt.id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list meal plan tasks")?;

    Ok(tasks)
}
