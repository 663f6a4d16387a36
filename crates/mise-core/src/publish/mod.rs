//! Change events and the seam that delivers them.

mod outbox;

pub use outbox::OutboxPublisher;

use std::fmt;

use async_trait::async_trait;
use mise_db::models::{IndexableType, MealPlanGroceryListItem, MealPlanTask};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PublishError;

/// Default topic for data change events.
pub const DEFAULT_DATA_CHANGES_TOPIC: &str = "data_changes";
/// Default topic for search re-index requests.
pub const DEFAULT_SEARCH_INDEXING_TOPIC: &str = "search_index_requests";

/// Topic names the workers publish to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub data_changes: String,
    pub search_indexing: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            data_changes: DEFAULT_DATA_CHANGES_TOPIC.to_owned(),
            search_indexing: DEFAULT_SEARCH_INDEXING_TOPIC.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEventType {
    MealPlanFinalized,
    MealPlanGroceryListItemCreated,
    MealPlanTaskCreated,
    SearchIndexRequested,
}

impl fmt::Display for ServiceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MealPlanFinalized => "meal_plan_finalized",
            Self::MealPlanGroceryListItemCreated => "meal_plan_grocery_list_item_created",
            Self::MealPlanTaskCreated => "meal_plan_task_created",
            Self::SearchIndexRequested => "search_index_requested",
        };
        f.write_str(s)
    }
}

/// One event on the bus. Consumers deduplicate on
/// `(event_type, entity_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeMessage {
    pub event_type: ServiceEventType,
    pub entity_type: String,
    pub entity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<Uuid>,
}

impl DataChangeMessage {
    pub fn meal_plan_finalized(meal_plan_id: Uuid, household_id: Uuid) -> Self {
        Self {
            event_type: ServiceEventType::MealPlanFinalized,
            entity_type: "meal_plan".to_owned(),
            entity_id: meal_plan_id,
            payload: None,
            meal_plan_id: Some(meal_plan_id),
            household_id: Some(household_id),
        }
    }

    pub fn grocery_list_item_created(
        item: &MealPlanGroceryListItem,
        household_id: Uuid,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            event_type: ServiceEventType::MealPlanGroceryListItemCreated,
            entity_type: "meal_plan_grocery_list_item".to_owned(),
            entity_id: item.id,
            payload: Some(serde_json::to_value(item)?),
            meal_plan_id: Some(item.belongs_to_meal_plan),
            household_id: Some(household_id),
        })
    }

    pub fn meal_plan_task_created(
        task: &MealPlanTask,
        meal_plan_id: Uuid,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            event_type: ServiceEventType::MealPlanTaskCreated,
            entity_type: "meal_plan_task".to_owned(),
            entity_id: task.id,
            payload: Some(serde_json::to_value(task)?),
            meal_plan_id: Some(meal_plan_id),
            household_id: None,
        })
    }

    pub fn search_index_requested(kind: IndexableType, entity_id: Uuid) -> Self {
        Self {
            event_type: ServiceEventType::SearchIndexRequested,
            entity_type: kind.to_string(),
            entity_id,
            payload: None,
            meal_plan_id: None,
            household_id: None,
        }
    }
}

/// At-least-once delivery of [`DataChangeMessage`]s to a named topic.
///
/// An `Ok` return means the broker has accepted the message durably.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &DataChangeMessage) -> Result<(), PublishError>;
}

// Compile-time check: Publisher must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Publisher) {}
};
