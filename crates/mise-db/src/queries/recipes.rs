//! Loaders for recipes and meals, deeply populated with their children.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{
    Meal, MealComponent, Recipe, RecipePrepTask, RecipePrepTaskStep, RecipeStep,
    RecipeStepIngredient, RecipeStepProduct,
};

/// Fetch a recipe with its steps, step ingredients, step products, prep tasks
/// and prep-task step links. Archived children are left out.
pub async fn get_recipe(conn: &mut PgConnection, id: Uuid) -> Result<Option<Recipe>> {
    let Some(mut recipe) = sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("failed to fetch recipe")?
    else {
        return Ok(None);
    };

    let mut steps = sqlx::query_as::<_, RecipeStep>(
        "SELECT rs.id, rs.belongs_to_recipe, rs.step_index, rs.preparation_id, \
                vp.name AS preparation_name, rs.optional, \
                rs.minimum_estimated_time_in_seconds, rs.maximum_estimated_time_in_seconds, \
                rs.minimum_temperature_in_celsius, rs.maximum_temperature_in_celsius, \
                rs.created_at \
         FROM recipe_steps rs \
         JOIN valid_preparations vp ON vp.id = rs.preparation_id \
         WHERE rs.belongs_to_recipe = $1 AND rs.archived_at IS NULL \
         ORDER BY rs.step_index ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch recipe steps")?;

    let ingredients = sqlx::query_as::<_, RecipeStepIngredient>(
        "SELECT rsi.* FROM recipe_step_ingredients rsi \
         JOIN recipe_steps rs ON rs.id = rsi.belongs_to_recipe_step \
         WHERE rs.belongs_to_recipe = $1 \
           AND rs.archived_at IS NULL AND rsi.archived_at IS NULL \
         ORDER BY rsi.created_at ASC, rsi.id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch recipe step ingredients")?;

    let products = sqlx::query_as::<_, RecipeStepProduct>(
        "SELECT rsp.* FROM recipe_step_products rsp \
         JOIN recipe_steps rs ON rs.id = rsp.belongs_to_recipe_step \
         WHERE rs.belongs_to_recipe = $1 \
           AND rs.archived_at IS NULL AND rsp.archived_at IS NULL \
         ORDER BY rsp.created_at ASC, rsp.id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch recipe step products")?;

    for step in &mut steps {
        step.ingredients = ingredients
            .iter()
            .filter(|i| i.belongs_to_recipe_step == step.id)
            .cloned()
            .collect();
        step.products = products
            .iter()
            .filter(|p| p.belongs_to_recipe_step == step.id)
            .cloned()
            .collect();
    }

    let mut prep_tasks = sqlx::query_as::<_, RecipePrepTask>(
        "SELECT * FROM recipe_prep_tasks \
         WHERE belongs_to_recipe = $1 AND archived_at IS NULL \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch recipe prep tasks")?;

    let task_steps = sqlx::query_as::<_, RecipePrepTaskStep>(
        "SELECT rpts.* FROM recipe_prep_task_steps rpts \
         JOIN recipe_prep_tasks rpt ON rpt.id = rpts.belongs_to_recipe_prep_task \
         WHERE rpt.belongs_to_recipe = $1 AND rpt.archived_at IS NULL \
         ORDER BY rpts.id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch recipe prep task steps")?;

    for task in &mut prep_tasks {
        task.task_steps = task_steps
            .iter()
            .filter(|s| s.belongs_to_recipe_prep_task == task.id)
            .cloned()
            .collect();
    }

    recipe.steps = steps;
    recipe.prep_tasks = prep_tasks;
    Ok(Some(recipe))
}

/// Fetch a meal with its (unarchived) components. Component recipes are not
/// loaded.
pub async fn get_meal(conn: &mut PgConnection, id: Uuid) -> Result<Option<Meal>> {
    let Some(mut meal) = sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("failed to fetch meal")?
    else {
        return Ok(None);
    };

    meal.components = sqlx::query_as::<_, MealComponent>(
        "SELECT * FROM meal_components \
         WHERE belongs_to_meal = $1 AND archived_at IS NULL \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .context("failed to fetch meal components")?;

    Ok(Some(meal))
}
