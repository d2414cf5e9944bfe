use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;

use crate::domain::repository::EventSink;
use crate::domain::types::{EVENTS_CHANNEL, TelemetryEvent};

/// Telemetry sink selected at startup.
#[derive(Clone)]
pub enum EventPublisher {
    /// PUBLISH on [`EVENTS_CHANNEL`].
    Redis(Pool),
    /// No telemetry store configured; events go to the log only.
    Log,
}

impl EventSink for EventPublisher {
    async fn publish(&self, event: &TelemetryEvent) {
        let pool = match self {
            Self::Log => {
                tracing::info!(
                    user_id = event.user_id,
                    action = ?event.action,
                    platform = %event.platform,
                    successful = event.successful,
                    "telemetry"
                );
                return;
            }
            Self::Redis(pool) => pool,
        };

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode telemetry event");
                return;
            }
        };
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry connection unavailable");
                return;
            }
        };
        let published: Result<i64, _> = conn.publish(EVENTS_CHANNEL, payload).await;
        if let Err(e) = published {
            tracing::warn!(error = %e, "failed to publish telemetry event");
        }
    }
}
