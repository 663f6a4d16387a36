//! Grocery list aggregation over a finalized meal plan.

use std::collections::BTreeMap;

use mise_db::models::{GroceryListItemStatus, MealPlan, NewGroceryListItem};
use tracing::warn;
use uuid::Uuid;

/// Sum the ingredient needs of every chosen option of `plan`.
///
/// Each raw ingredient contributes its quantity range scaled by the
/// component's `recipe_scale` and the option's `meal_scale`; a missing
/// maximum falls back to the minimum. Ingredients that are the product of an
/// earlier step are made in the kitchen and do not count. Chosen options
/// whose meal or recipe was not loaded are skipped with a warning.
///
/// One item is returned per (ingredient, unit) pair, sorted by that pair.
pub fn aggregate_grocery_list(plan: &MealPlan) -> Vec<NewGroceryListItem> {
    let mut totals: BTreeMap<(Uuid, Uuid), (f64, f64)> = BTreeMap::new();

    for event in &plan.events {
        for option in event.options.iter().filter(|o| o.chosen) {
            let Some(meal) = &option.meal else {
                warn!(
                    meal_plan_id = %plan.id,
                    meal_plan_option_id = %option.id,
                    meal_id = %option.meal_id,
                    "chosen option has no loaded meal, skipping"
                );
                continue;
            };

            for component in &meal.components {
                let Some(recipe) = &component.recipe else {
                    warn!(
                        meal_plan_id = %plan.id,
                        meal_id = %meal.id,
                        recipe_id = %component.recipe_id,
                        "meal component has no loaded recipe, skipping"
                    );
                    continue;
                };
                let scale = component.recipe_scale * option.meal_scale;

                for ingredient in recipe.steps.iter().flat_map(|s| &s.ingredients) {
                    if ingredient.recipe_step_product_id.is_some() {
                        continue;
                    }
                    let Some(ingredient_id) = ingredient.ingredient_id else {
                        warn!(
                            recipe_id = %recipe.id,
                            recipe_step_ingredient_id = %ingredient.id,
                            "ingredient has no source, skipping"
                        );
                        continue;
                    };

                    let min = ingredient.minimum_quantity * scale;
                    let max = ingredient
                        .maximum_quantity
                        .unwrap_or(ingredient.minimum_quantity)
                        * scale;
                    let total = totals
                        .entry((ingredient_id, ingredient.measurement_unit_id))
                        .or_insert((0.0, 0.0));
                    total.0 += min;
                    total.1 += max;
                }
            }
        }
    }

    totals
        .into_iter()
        .map(|((ingredient_id, unit_id), (min, max))| NewGroceryListItem {
            belongs_to_meal_plan: plan.id,
            valid_ingredient_id: ingredient_id,
            valid_measurement_unit_id: unit_id,
            minimum_quantity_needed: min,
            maximum_quantity_needed: Some(max),
            status: GroceryListItemStatus::Needs,
            status_explanation: String::new(),
        })
        .collect()
}
