//! Pending work across the workflow, for operator summaries.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// How much work each worker has waiting, plus what has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct WorkflowBacklog {
    /// Open plans still collecting votes.
    pub voting: i64,
    /// Open plans past their voting deadline.
    pub awaiting_finalization: i64,
    pub awaiting_grocery_list: i64,
    pub awaiting_tasks: i64,
    pub grocery_list_items: i64,
    pub meal_plan_tasks: i64,
    /// Messages appended to the outbox, on every topic.
    pub outbox_messages: i64,
}

/// Count unarchived plans by the stage they wait in.
pub async fn workflow_backlog(pool: &PgPool) -> Result<WorkflowBacklog> {
    let backlog = sqlx::query_as::<_, WorkflowBacklog>(
        "SELECT \
           COUNT(*) FILTER (WHERE status = 'open' AND voting_deadline >= NOW()) AS voting, \
           COUNT(*) FILTER (WHERE status = 'open' AND voting_deadline < NOW()) \
             AS awaiting_finalization, \
           COUNT(*) FILTER (WHERE status = 'finalized' AND NOT grocery_list_initialized) \
             AS awaiting_grocery_list, \
           COUNT(*) FILTER (WHERE status = 'finalized' AND NOT tasks_created) AS awaiting_tasks, \
           (SELECT COUNT(*) FROM meal_plan_grocery_list_items) AS grocery_list_items, \
           (SELECT COUNT(*) FROM meal_plan_tasks) AS meal_plan_tasks, \
           (SELECT COUNT(*) FROM outbox_messages) AS outbox_messages \
         FROM meal_plans \
         WHERE archived_at IS NULL",
    )
    .fetch_one(pool)
    .await
    .context("failed to count workflow backlog")?;

    Ok(backlog)
}
