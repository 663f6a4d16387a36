use async_trait::async_trait;
use mise_db::queries::outbox;
use sqlx::PgPool;
use tracing::debug;

use super::{DataChangeMessage, Publisher};
use crate::error::PublishError;

/// Publishes by appending to the `outbox_messages` table. A relay outside
/// this process forwards rows to the broker.
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    pool: PgPool,
}

impl OutboxPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Publisher for OutboxPublisher {
    async fn publish(&self, topic: &str, message: &DataChangeMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_value(message)?;
        let sequence = outbox::insert_message(&self.pool, topic, &payload)
            .await
            .map_err(|cause| PublishError::Delivery {
                topic: topic.to_owned(),
                cause,
            })?;
        debug!(
            topic,
            sequence,
            event_type = %message.event_type,
            entity_id = %message.entity_id,
            "message appended to outbox"
        );
        Ok(())
    }
}
