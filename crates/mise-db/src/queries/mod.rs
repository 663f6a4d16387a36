pub mod backlog;
pub mod grocery_list_items;
pub mod meal_plan_tasks;
pub mod meal_plans;
pub mod outbox;
pub mod recipes;
pub mod search_index;
