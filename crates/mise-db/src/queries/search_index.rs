//! Enumeration of entities due for search re-indexing.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::IndexableType;

/// IDs of unarchived rows of `kind` that were never indexed or were last
/// indexed more than a day ago, ordered by ID.
pub async fn list_ids_needing_indexing(pool: &PgPool, kind: IndexableType) -> Result<Vec<Uuid>> {
    // table_name() only yields fixed identifiers.
    let query = format!(
        "SELECT id FROM {} \
         WHERE archived_at IS NULL \
           AND (last_indexed_at IS NULL OR last_indexed_at < NOW() - INTERVAL '24 hours') \
         ORDER BY id ASC",
        kind.table_name()
    );

    let rows: Vec<(Uuid,)> = sqlx::query_as(&query)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to list {kind} needing indexing"))?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
