use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle of a meal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    Open,
    Finalized,
    Archived,
}

impl fmt::Display for MealPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Finalized => "finalized",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanStatus {
    type Err = MealPlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "finalized" => Ok(Self::Finalized),
            "archived" => Ok(Self::Archived),
            other => Err(MealPlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanStatusParseError(pub String);

impl fmt::Display for MealPlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal plan status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanStatusParseError {}

// ---------------------------------------------------------------------------

/// How the votes on each event of a meal plan are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ElectionMethod {
    /// Instant-runoff over ranked ballots.
    RankedChoice,
    FirstPastThePost,
}

impl fmt::Display for ElectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RankedChoice => "ranked_choice",
            Self::FirstPastThePost => "first_past_the_post",
        };
        f.write_str(s)
    }
}

impl FromStr for ElectionMethod {
    type Err = ElectionMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranked_choice" => Ok(Self::RankedChoice),
            "first_past_the_post" => Ok(Self::FirstPastThePost),
            other => Err(ElectionMethodParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ElectionMethod`] string.
#[derive(Debug, Clone)]
pub struct ElectionMethodParseError(pub String);

impl fmt::Display for ElectionMethodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid election method: {:?}", self.0)
    }
}

impl std::error::Error for ElectionMethodParseError {}

// ---------------------------------------------------------------------------

/// Progress of a scheduled advance-prep task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanTaskStatus {
    Unfinished,
    InProgress,
    Ignored,
    Postponed,
    Finished,
}

impl fmt::Display for MealPlanTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unfinished => "unfinished",
            Self::InProgress => "in_progress",
            Self::Ignored => "ignored",
            Self::Postponed => "postponed",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanTaskStatus {
    type Err = MealPlanTaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unfinished" => Ok(Self::Unfinished),
            "in_progress" => Ok(Self::InProgress),
            "ignored" => Ok(Self::Ignored),
            "postponed" => Ok(Self::Postponed),
            "finished" => Ok(Self::Finished),
            other => Err(MealPlanTaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanTaskStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanTaskStatusParseError(pub String);

impl fmt::Display for MealPlanTaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal plan task status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanTaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Shopping state of a grocery list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroceryListItemStatus {
    Needs,
    AlreadyHave,
    Unavailable,
    Acquired,
    Unknown,
}

impl fmt::Display for GroceryListItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Needs => "needs",
            Self::AlreadyHave => "already_have",
            Self::Unavailable => "unavailable",
            Self::Acquired => "acquired",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for GroceryListItemStatus {
    type Err = GroceryListItemStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs" => Ok(Self::Needs),
            "already_have" => Ok(Self::AlreadyHave),
            "unavailable" => Ok(Self::Unavailable),
            "acquired" => Ok(Self::Acquired),
            "unknown" => Ok(Self::Unknown),
            other => Err(GroceryListItemStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GroceryListItemStatus`] string.
#[derive(Debug, Clone)]
pub struct GroceryListItemStatusParseError(pub String);

impl fmt::Display for GroceryListItemStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grocery list item status: {:?}", self.0)
    }
}

impl std::error::Error for GroceryListItemStatusParseError {}

// ---------------------------------------------------------------------------

/// What a recipe step yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipeStepProductType {
    Ingredient,
    Instrument,
    Vessel,
}

impl fmt::Display for RecipeStepProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ingredient => "ingredient",
            Self::Instrument => "instrument",
            Self::Vessel => "vessel",
        };
        f.write_str(s)
    }
}

impl FromStr for RecipeStepProductType {
    type Err = RecipeStepProductTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingredient" => Ok(Self::Ingredient),
            "instrument" => Ok(Self::Instrument),
            "vessel" => Ok(Self::Vessel),
            other => Err(RecipeStepProductTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RecipeStepProductType`] string.
#[derive(Debug, Clone)]
pub struct RecipeStepProductTypeParseError(pub String);

impl fmt::Display for RecipeStepProductTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid recipe step product type: {:?}", self.0)
    }
}

impl std::error::Error for RecipeStepProductTypeParseError {}

// ---------------------------------------------------------------------------

/// How the output of a prep task is stored until the meal is cooked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StorageContainerType {
    Uncovered,
    Covered,
    OnAWireRack,
    InAnAirtightContainer,
}

impl fmt::Display for StorageContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uncovered => "uncovered",
            Self::Covered => "covered",
            Self::OnAWireRack => "on_a_wire_rack",
            Self::InAnAirtightContainer => "in_an_airtight_container",
        };
        f.write_str(s)
    }
}

impl FromStr for StorageContainerType {
    type Err = StorageContainerTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncovered" => Ok(Self::Uncovered),
            "covered" => Ok(Self::Covered),
            "on_a_wire_rack" => Ok(Self::OnAWireRack),
            "in_an_airtight_container" => Ok(Self::InAnAirtightContainer),
            other => Err(StorageContainerTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`StorageContainerType`] string.
#[derive(Debug, Clone)]
pub struct StorageContainerTypeParseError(pub String);

impl fmt::Display for StorageContainerTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid storage container type: {:?}", self.0)
    }
}

impl std::error::Error for StorageContainerTypeParseError {}

// ---------------------------------------------------------------------------

/// Entity types that participate in the text search index.
///
/// The string form doubles as the backing table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexableType {
    ValidIngredients,
    ValidMeasurementUnits,
    ValidPreparations,
    Recipes,
    Meals,
}

impl IndexableType {
    /// Every indexable type, in registration order.
    pub const ALL: [IndexableType; 5] = [
        Self::ValidIngredients,
        Self::ValidMeasurementUnits,
        Self::ValidPreparations,
        Self::Recipes,
        Self::Meals,
    ];

    /// Table holding rows of this type.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::ValidIngredients => "valid_ingredients",
            Self::ValidMeasurementUnits => "valid_measurement_units",
            Self::ValidPreparations => "valid_preparations",
            Self::Recipes => "recipes",
            Self::Meals => "meals",
        }
    }
}

impl fmt::Display for IndexableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for IndexableType {
    type Err = IndexableTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.table_name() == s)
            .ok_or_else(|| IndexableTypeParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`IndexableType`] string.
#[derive(Debug, Clone)]
pub struct IndexableTypeParseError(pub String);

impl fmt::Display for IndexableTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid indexable type: {:?}", self.0)
    }
}

impl std::error::Error for IndexableTypeParseError {}

// ---------------------------------------------------------------------------
// Meal plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub id: Uuid,
    pub belongs_to_household: Uuid,
    pub status: MealPlanStatus,
    pub voting_deadline: DateTime<Utc>,
    pub election_method: ElectionMethod,
    pub tasks_created: bool,
    pub grocery_list_initialized: bool,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(default)]
    pub events: Vec<MealPlanEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanEvent {
    pub id: Uuid,
    pub belongs_to_meal_plan: Uuid,
    pub meal_name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub options: Vec<MealPlanOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOption {
    pub id: Uuid,
    pub belongs_to_meal_plan_event: Uuid,
    pub meal_id: Uuid,
    pub meal_scale: f64,
    pub chosen: bool,
    pub tiebroken: bool,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub votes: Vec<MealPlanOptionVote>,
    /// Filled in for chosen options when a plan is loaded for grocery work.
    #[sqlx(skip)]
    #[serde(default)]
    pub meal: Option<Meal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOptionVote {
    pub id: Uuid,
    pub belongs_to_meal_plan_option: Uuid,
    pub by_user: Uuid,
    pub rank: i32,
    pub abstain: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Meals and recipes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(default)]
    pub components: Vec<MealComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealComponent {
    pub id: Uuid,
    pub belongs_to_meal: Uuid,
    pub recipe_id: Uuid,
    pub recipe_scale: f64,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[sqlx(skip)]
    #[serde(default)]
    pub prep_tasks: Vec<RecipePrepTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStep {
    pub id: Uuid,
    pub belongs_to_recipe: Uuid,
    pub step_index: i32,
    pub preparation_id: Uuid,
    /// Joined from `valid_preparations`.
    pub preparation_name: String,
    pub optional: bool,
    pub minimum_estimated_time_in_seconds: Option<i32>,
    pub maximum_estimated_time_in_seconds: Option<i32>,
    pub minimum_temperature_in_celsius: Option<f64>,
    pub maximum_temperature_in_celsius: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub ingredients: Vec<RecipeStepIngredient>,
    #[sqlx(skip)]
    #[serde(default)]
    pub products: Vec<RecipeStepProduct>,
}

/// An input to a recipe step.
///
/// Exactly one of `ingredient_id` and `recipe_step_product_id` is set; the
/// latter points at a product of an earlier step.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepIngredient {
    pub id: Uuid,
    pub belongs_to_recipe_step: Uuid,
    pub name: String,
    pub ingredient_id: Option<Uuid>,
    pub recipe_step_product_id: Option<Uuid>,
    pub measurement_unit_id: Uuid,
    pub minimum_quantity: f64,
    pub maximum_quantity: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepProduct {
    pub id: Uuid,
    pub belongs_to_recipe_step: Uuid,
    pub name: String,
    pub product_type: RecipeStepProductType,
    pub minimum_storage_duration_in_seconds: Option<i32>,
    pub minimum_storage_temperature_in_celsius: Option<f64>,
    pub maximum_storage_temperature_in_celsius: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipePrepTask {
    pub id: Uuid,
    pub belongs_to_recipe: Uuid,
    pub name: String,
    pub description: String,
    pub optional: bool,
    pub minimum_time_buffer_before_recipe_in_seconds: i32,
    pub maximum_time_buffer_before_recipe_in_seconds: Option<i32>,
    pub storage_type: Option<StorageContainerType>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub task_steps: Vec<RecipePrepTaskStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipePrepTaskStep {
    pub id: Uuid,
    pub belongs_to_recipe_prep_task: Uuid,
    pub belongs_to_recipe_step: Uuid,
    pub satisfies_recipe_step: bool,
}

// ---------------------------------------------------------------------------
// Worker outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanTask {
    pub id: Uuid,
    pub belongs_to_meal_plan_option: Uuid,
    pub belongs_to_recipe_prep_task: Uuid,
    pub status: MealPlanTaskStatus,
    pub status_explanation: String,
    pub creation_explanation: String,
    pub assigned_to_user: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanGroceryListItem {
    pub id: Uuid,
    pub belongs_to_meal_plan: Uuid,
    pub valid_ingredient_id: Uuid,
    pub valid_measurement_unit_id: Uuid,
    pub minimum_quantity_needed: f64,
    pub maximum_quantity_needed: Option<f64>,
    pub status: GroceryListItemStatus,
    pub status_explanation: String,
    pub created_at: DateTime<Utc>,
}

/// A message appended to the transactional outbox.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub topic: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a [`MealPlanTask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMealPlanTask {
    pub belongs_to_meal_plan_option: Uuid,
    pub belongs_to_recipe_prep_task: Uuid,
    pub status: MealPlanTaskStatus,
    pub creation_explanation: String,
    pub assigned_to_user: Option<Uuid>,
}

/// Input for creating a [`MealPlanGroceryListItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGroceryListItem {
    pub belongs_to_meal_plan: Uuid,
    pub valid_ingredient_id: Uuid,
    pub valid_measurement_unit_id: Uuid,
    pub minimum_quantity_needed: f64,
    pub maximum_quantity_needed: Option<f64>,
    pub status: GroceryListItemStatus,
    pub status_explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_plan_status_display_roundtrip() {
        for status in [
            MealPlanStatus::Open,
            MealPlanStatus::Finalized,
            MealPlanStatus::Archived,
        ] {
            let parsed: MealPlanStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn meal_plan_status_invalid() {
        let err = "closed".parse::<MealPlanStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid meal plan status: \"closed\"");
    }

    #[test]
    fn election_method_strings() {
        assert_eq!(ElectionMethod::RankedChoice.to_string(), "ranked_choice");
        assert_eq!(
            "first_past_the_post".parse::<ElectionMethod>().unwrap(),
            ElectionMethod::FirstPastThePost
        );
        assert!("schulze".parse::<ElectionMethod>().is_err());
    }

    #[test]
    fn task_status_multiword_variant() {
        assert_eq!(MealPlanTaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "in_progress".parse::<MealPlanTaskStatus>().unwrap(),
            MealPlanTaskStatus::InProgress
        );
        assert!("in-progress".parse::<MealPlanTaskStatus>().is_err());
    }

    #[test]
    fn grocery_status_multiword_variant() {
        assert_eq!(
            "already_have".parse::<GroceryListItemStatus>().unwrap(),
            GroceryListItemStatus::AlreadyHave
        );
        assert!("have".parse::<GroceryListItemStatus>().is_err());
    }

    #[test]
    fn storage_container_strings() {
        assert_eq!(
            StorageContainerType::InAnAirtightContainer.to_string(),
            "in_an_airtight_container"
        );
        assert_eq!(
            "on_a_wire_rack".parse::<StorageContainerType>().unwrap(),
            StorageContainerType::OnAWireRack
        );
    }

    #[test]
    fn product_type_invalid() {
        let err = "appliance".parse::<RecipeStepProductType>().unwrap_err();
        assert!(err.to_string().contains("appliance"));
    }

    #[test]
    fn indexable_type_matches_table_names() {
        for t in IndexableType::ALL {
            assert_eq!(t.to_string(), t.table_name());
            assert_eq!(t.table_name().parse::<IndexableType>().unwrap(), t);
        }
        assert!("users".parse::<IndexableType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&MealPlanTaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&IndexableType::ValidIngredients).unwrap();
        assert_eq!(json, "\"valid_ingredients\"");
    }
}
