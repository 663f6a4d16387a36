//! Row-level seeding helpers for SQL tests. Every helper returns the new
//! row's ID and panics on failure.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mise_db::models::{ElectionMethod, MealPlanStatus};

async fn insert_returning_id(pool: &PgPool, sql: &str, name: &str) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(sql)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("seed failed for {sql}: {e}"));
    row.0
}

pub async fn household(pool: &PgPool) -> Uuid {
    insert_returning_id(
        pool,
        "INSERT INTO households (name) VALUES ($1) RETURNING id",
        "household",
    )
    .await
}

pub async fn valid_ingredient(pool: &PgPool, name: &str) -> Uuid {
    insert_returning_id(
        pool,
        "INSERT INTO valid_ingredients (name) VALUES ($1) RETURNING id",
        name,
    )
    .await
}

pub async fn measurement_unit(pool: &PgPool, name: &str) -> Uuid {
    insert_returning_id(
        pool,
        "INSERT INTO valid_measurement_units (name) VALUES ($1) RETURNING id",
        name,
    )
    .await
}

pub async fn preparation(pool: &PgPool, name: &str) -> Uuid {
    insert_returning_id(
        pool,
        "INSERT INTO valid_preparations (name) VALUES ($1) RETURNING id",
        name,
    )
    .await
}

pub async fn recipe(pool: &PgPool, name: &str) -> Uuid {
    insert_returning_id(
        pool,
        "INSERT INTO recipes (name) VALUES ($1) RETURNING id",
        name,
    )
    .await
}

pub async fn recipe_step(pool: &PgPool, recipe_id: Uuid, index: i32, preparation_id: Uuid) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO recipe_steps (belongs_to_recipe, step_index, preparation_id) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(recipe_id)
    .bind(index)
    .bind(preparation_id)
    .fetch_one(pool)
    .await
    .expect("seed recipe step");
    row.0
}

pub async fn step_ingredient(
    pool: &PgPool,
    step_id: Uuid,
    ingredient_id: Uuid,
    unit_id: Uuid,
    min: f64,
    max: Option<f64>,
) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO recipe_step_ingredients \
             (belongs_to_recipe_step, name, ingredient_id, measurement_unit_id, \
              minimum_quantity, maximum_quantity) \
         VALUES ($1, 'ingredient', $2, $3, $4, $5) RETURNING id",
    )
    .bind(step_id)
    .bind(ingredient_id)
    .bind(unit_id)
    .bind(min)
    .bind(max)
    .fetch_one(pool)
    .await
    .expect("seed step ingredient");
    row.0
}

pub async fn step_product(pool: &PgPool, step_id: Uuid, name: &str) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO recipe_step_products (belongs_to_recipe_step, name, product_type) \
         VALUES ($1, $2, 'ingredient') RETURNING id",
    )
    .bind(step_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("seed step product");
    row.0
}

/// An ingredient of `step_id` that is the product `product_id` of an earlier
/// step.
pub async fn step_product_input(
    pool: &PgPool,
    step_id: Uuid,
    product_id: Uuid,
    unit_id: Uuid,
) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO recipe_step_ingredients \
             (belongs_to_recipe_step, name, recipe_step_product_id, measurement_unit_id, \
              minimum_quantity) \
         VALUES ($1, 'product', $2, $3, 1) RETURNING id",
    )
    .bind(step_id)
    .bind(product_id)
    .bind(unit_id)
    .fetch_one(pool)
    .await
    .expect("seed step product input");
    row.0
}

pub async fn prep_task(pool: &PgPool, recipe_id: Uuid, name: &str, step_ids: &[Uuid]) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO recipe_prep_tasks (belongs_to_recipe, name, description) \
         VALUES ($1, $2, $2) RETURNING id",
    )
    .bind(recipe_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("seed prep task");

    for step_id in step_ids {
        sqlx::query(
            "INSERT INTO recipe_prep_task_steps \
                 (belongs_to_recipe_prep_task, belongs_to_recipe_step, satisfies_recipe_step) \
             VALUES ($1, $2, TRUE)",
        )
        .bind(row.0)
        .bind(step_id)
        .execute(pool)
        .await
        .expect("seed prep task step");
    }
    row.0
}

/// A meal made of `(recipe_id, recipe_scale)` components.
pub async fn meal(pool: &PgPool, name: &str, components: &[(Uuid, f64)]) -> Uuid {
    let meal_id = insert_returning_id(
        pool,
        "INSERT INTO meals (name) VALUES ($1) RETURNING id",
        name,
    )
    .await;

    for (recipe_id, scale) in components {
        sqlx::query(
            "INSERT INTO meal_components (belongs_to_meal, recipe_id, recipe_scale) \
             VALUES ($1, $2, $3)",
        )
        .bind(meal_id)
        .bind(recipe_id)
        .bind(scale)
        .execute(pool)
        .await
        .expect("seed meal component");
    }
    meal_id
}

pub async fn meal_plan(
    pool: &PgPool,
    household_id: Uuid,
    voting_deadline: DateTime<Utc>,
    method: ElectionMethod,
) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO meal_plans (belongs_to_household, voting_deadline, election_method) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(household_id)
    .bind(voting_deadline)
    .bind(method)
    .fetch_one(pool)
    .await
    .expect("seed meal plan");
    row.0
}

/// Force a plan into `status`, bypassing the workers.
pub async fn set_meal_plan_status(pool: &PgPool, meal_plan_id: Uuid, status: MealPlanStatus) {
    sqlx::query("UPDATE meal_plans SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(meal_plan_id)
        .execute(pool)
        .await
        .expect("seed meal plan status");
}

/// A one-hour event starting at `starts_at`.
pub async fn event(
    pool: &PgPool,
    meal_plan_id: Uuid,
    meal_name: &str,
    starts_at: DateTime<Utc>,
) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO meal_plan_events (belongs_to_meal_plan, meal_name, starts_at, ends_at) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(meal_plan_id)
    .bind(meal_name)
    .bind(starts_at)
    .bind(starts_at + Duration::hours(1))
    .fetch_one(pool)
    .await
    .expect("seed meal plan event");
    row.0
}

pub async fn option(pool: &PgPool, event_id: Uuid, meal_id: Uuid, meal_scale: f64) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO meal_plan_options (belongs_to_meal_plan_event, meal_id, meal_scale) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(event_id)
    .bind(meal_id)
    .bind(meal_scale)
    .fetch_one(pool)
    .await
    .expect("seed meal plan option");
    row.0
}

/// Mark an option as chosen, bypassing the election.
pub async fn choose_option(pool: &PgPool, option_id: Uuid) {
    sqlx::query("UPDATE meal_plan_options SET chosen = TRUE WHERE id = $1")
        .bind(option_id)
        .execute(pool)
        .await
        .expect("seed chosen option");
}

pub async fn vote(pool: &PgPool, option_id: Uuid, by_user: Uuid, rank: i32, abstain: bool) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO meal_plan_option_votes (belongs_to_meal_plan_option, by_user, rank, abstain) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(option_id)
    .bind(by_user)
    .bind(rank)
    .bind(abstain)
    .fetch_one(pool)
    .await
    .expect("seed vote");
    row.0
}
