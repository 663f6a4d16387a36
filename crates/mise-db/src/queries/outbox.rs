//! Database query functions for the `outbox_messages` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::OutboxMessage;

/// Append a message to the outbox. Returns the assigned sequence number.
pub async fn insert_message(
    pool: &PgPool,
    topic: &str,
    payload: &serde_json::Value,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO outbox_messages (topic, payload) VALUES ($1, $2) RETURNING id",
    )
    .bind(topic)
    .bind(payload)
    .fetch_one(pool)
    .await
    .context("failed to insert outbox message")?;

    Ok(row.0)
}

/// List messages on a topic in append order.
pub async fn list_messages(pool: &PgPool, topic: &str) -> Result<Vec<OutboxMessage>> {
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM outbox_messages WHERE topic = $1 ORDER BY id ASC",
    )
    .bind(topic)
    .fetch_all(pool)
    .await
    .context("failed to list outbox messages")?;

    Ok(messages)
}
