use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::migrate::MigrateDatabase;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/mise-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Create a connection pool for the configured database.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Apply every embedded migration the database has not seen yet.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!(known = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Create the configured database unless it already exists. Returns whether
/// it was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let url = config.database_url.as_str();
    let db = config.database_name().unwrap_or("<unnamed>");

    let exists = Postgres::database_exists(url)
        .await
        .with_context(|| format!("failed to check whether database {db} exists"))?;
    if exists {
        info!(db, "database already exists");
        return Ok(false);
    }

    Postgres::create_database(url)
        .await
        .with_context(|| format!("failed to create database {db}"))?;
    info!(db, "database created");
    Ok(true)
}
