//! Persistence layer for the meal-plan workflow engine.
//!
//! Holds the schema (embedded migrations), row models, connection pool
//! helpers, and one query module per table group.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
