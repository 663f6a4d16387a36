//! In-memory builders for model trees, for tests that never touch SQL.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use mise_db::models::{
    ElectionMethod, Meal, MealComponent, MealPlan, MealPlanEvent, MealPlanOption,
    MealPlanOptionVote, MealPlanStatus, Recipe, RecipePrepTask, RecipePrepTaskStep, RecipeStep,
    RecipeStepIngredient, RecipeStepProduct, RecipeStepProductType,
};

/// An open plan whose voting deadline passed an hour ago.
pub fn meal_plan(method: ElectionMethod) -> MealPlan {
    let now = Utc::now();
    MealPlan {
        id: Uuid::new_v4(),
        belongs_to_household: Uuid::new_v4(),
        status: MealPlanStatus::Open,
        voting_deadline: now - Duration::hours(1),
        election_method: method,
        tasks_created: false,
        grocery_list_initialized: false,
        created_at: now - Duration::days(2),
        archived_at: None,
        events: Vec::new(),
    }
}

/// A one-hour event of `plan` starting at `starts_at`.
pub fn event(plan: &MealPlan, meal_name: &str, starts_at: DateTime<Utc>) -> MealPlanEvent {
    MealPlanEvent {
        id: Uuid::new_v4(),
        belongs_to_meal_plan: plan.id,
        meal_name: meal_name.to_owned(),
        starts_at,
        ends_at: starts_at + Duration::hours(1),
        created_at: plan.created_at,
        options: Vec::new(),
    }
}

/// An unchosen option of `event` for `meal`.
pub fn option(event: &MealPlanEvent, meal: &Meal, meal_scale: f64) -> MealPlanOption {
    MealPlanOption {
        id: Uuid::new_v4(),
        belongs_to_meal_plan_event: event.id,
        meal_id: meal.id,
        meal_scale,
        chosen: false,
        tiebroken: false,
        created_at: event.created_at,
        votes: Vec::new(),
        meal: Some(meal.clone()),
    }
}

/// Like [`option`] but already marked as the winner.
pub fn chosen_option(event: &MealPlanEvent, meal: &Meal, meal_scale: f64) -> MealPlanOption {
    MealPlanOption {
        chosen: true,
        ..option(event, meal, meal_scale)
    }
}

/// Record one voter's ranking over `options`; `ranking` lists option
/// positions from most to least preferred. Unranked options get no vote.
/// Returns the voter's ID.
pub fn cast_ballot(options: &mut [MealPlanOption], ranking: &[usize]) -> Uuid {
    let voter = Uuid::new_v4();
    for (rank, &position) in ranking.iter().enumerate() {
        let option = &mut options[position];
        option.votes.push(vote(option.id, voter, rank as i32 + 1, false));
    }
    voter
}

/// Record an abstention from a fresh voter on every option.
pub fn abstain_all(options: &mut [MealPlanOption]) -> Uuid {
    let voter = Uuid::new_v4();
    for option in options.iter_mut() {
        option.votes.push(vote(option.id, voter, 1, true));
    }
    voter
}

fn vote(option_id: Uuid, by_user: Uuid, rank: i32, abstain: bool) -> MealPlanOptionVote {
    MealPlanOptionVote {
        id: Uuid::new_v4(),
        belongs_to_meal_plan_option: option_id,
        by_user,
        rank,
        abstain,
        created_at: Utc::now(),
    }
}

/// A meal made of the given `(recipe, recipe_scale)` components.
pub fn meal(name: &str, components: Vec<(Recipe, f64)>) -> Meal {
    let id = Uuid::new_v4();
    Meal {
        id,
        name: name.to_owned(),
        created_at: Utc::now(),
        archived_at: None,
        last_indexed_at: None,
        components: components
            .into_iter()
            .map(|(recipe, recipe_scale)| MealComponent {
                id: Uuid::new_v4(),
                belongs_to_meal: id,
                recipe_id: recipe.id,
                recipe_scale,
                created_at: Utc::now(),
                recipe: Some(recipe),
            })
            .collect(),
    }
}

/// Builder for [`Recipe`] trees. Steps are addressed by their position.
pub struct RecipeBuilder {
    recipe: Recipe,
}

impl RecipeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            recipe: Recipe {
                id: Uuid::new_v4(),
                name: name.to_owned(),
                created_at: Utc::now(),
                archived_at: None,
                last_indexed_at: None,
                steps: Vec::new(),
                prep_tasks: Vec::new(),
            },
        }
    }

    /// Append a step performing `preparation`.
    pub fn step(mut self, preparation: &str) -> Self {
        let index = self.recipe.steps.len() as i32;
        self.recipe.steps.push(RecipeStep {
            id: Uuid::new_v4(),
            belongs_to_recipe: self.recipe.id,
            step_index: index,
            preparation_id: Uuid::new_v4(),
            preparation_name: preparation.to_owned(),
            optional: false,
            minimum_estimated_time_in_seconds: None,
            maximum_estimated_time_in_seconds: None,
            minimum_temperature_in_celsius: None,
            maximum_temperature_in_celsius: None,
            created_at: Utc::now(),
            ingredients: Vec::new(),
            products: Vec::new(),
        });
        self
    }

    /// Add a raw ingredient to step `step`.
    pub fn ingredient(
        mut self,
        step: usize,
        ingredient_id: Uuid,
        unit_id: Uuid,
        min: f64,
        max: Option<f64>,
    ) -> Self {
        let step = &mut self.recipe.steps[step];
        step.ingredients.push(RecipeStepIngredient {
            id: Uuid::new_v4(),
            belongs_to_recipe_step: step.id,
            name: format!("ingredient {}", step.ingredients.len()),
            ingredient_id: Some(ingredient_id),
            recipe_step_product_id: None,
            measurement_unit_id: unit_id,
            minimum_quantity: min,
            maximum_quantity: max,
            created_at: Utc::now(),
        });
        self
    }

    /// Add an ingredient-type product named `name` to step `step`.
    pub fn product(mut self, step: usize, name: &str) -> Self {
        let step = &mut self.recipe.steps[step];
        step.products.push(RecipeStepProduct {
            id: Uuid::new_v4(),
            belongs_to_recipe_step: step.id,
            name: name.to_owned(),
            product_type: RecipeStepProductType::Ingredient,
            minimum_storage_duration_in_seconds: None,
            minimum_storage_temperature_in_celsius: None,
            maximum_storage_temperature_in_celsius: None,
            created_at: Utc::now(),
        });
        self
    }

    /// Make step `step` consume the product called `name` of step `from`.
    ///
    /// Panics if `from` has no such product.
    pub fn uses_product(self, step: usize, from: usize, name: &str) -> Self {
        let product_id = self.recipe.steps[from]
            .products
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .unwrap_or_else(|| panic!("step {from} has no product named {name:?}"));
        self.product_input(step, product_id, name)
    }

    /// Make step `step` consume a product that no step of this recipe makes.
    pub fn dangling_product_input(self, step: usize) -> Self {
        self.product_input(step, Uuid::new_v4(), "mystery")
    }

    fn product_input(mut self, step: usize, product_id: Uuid, name: &str) -> Self {
        let step = &mut self.recipe.steps[step];
        step.ingredients.push(RecipeStepIngredient {
            id: Uuid::new_v4(),
            belongs_to_recipe_step: step.id,
            name: name.to_owned(),
            ingredient_id: None,
            recipe_step_product_id: Some(product_id),
            measurement_unit_id: Uuid::new_v4(),
            minimum_quantity: 1.0,
            maximum_quantity: None,
            created_at: Utc::now(),
        });
        self
    }

    /// Attach a prep task covering the steps at `steps`.
    pub fn prep_task(mut self, name: &str, steps: &[usize]) -> Self {
        let task_id = Uuid::new_v4();
        let task_steps = steps
            .iter()
            .map(|&i| RecipePrepTaskStep {
                id: Uuid::new_v4(),
                belongs_to_recipe_prep_task: task_id,
                belongs_to_recipe_step: self.recipe.steps[i].id,
                satisfies_recipe_step: true,
            })
            .collect();
        self.recipe.prep_tasks.push(RecipePrepTask {
            id: task_id,
            belongs_to_recipe: self.recipe.id,
            name: name.to_owned(),
            description: format!("{name} ahead of time"),
            optional: false,
            minimum_time_buffer_before_recipe_in_seconds: 3600,
            maximum_time_buffer_before_recipe_in_seconds: None,
            storage_type: None,
            created_at: Utc::now(),
            task_steps,
        });
        self
    }

    pub fn build(self) -> Recipe {
        self.recipe
    }
}

/// Continue building on top of an existing recipe.
impl From<Recipe> for RecipeBuilder {
    fn from(recipe: Recipe) -> Self {
        Self { recipe }
    }
}

/// A single-step recipe using `quantity` of one ingredient.
pub fn single_ingredient_recipe(ingredient_id: Uuid, unit_id: Uuid, quantity: f64) -> Recipe {
    RecipeBuilder::new("simple")
        .step("combine")
        .ingredient(0, ingredient_id, unit_id, quantity, None)
        .build()
}
