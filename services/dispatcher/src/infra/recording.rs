use serde_json::json;

use crate::domain::repository::{AndroidPushPort, ApnsPort, CommandQueue, GroupKeyProvider};
use crate::domain::types::{AndroidPush, ApnsNotification, GroupKeyOperation, PUSH_RECORD_LIST};
use crate::error::DispatcherError;

/// Push provider that records instead of delivering.
///
/// Every push and group-key operation is appended as JSON to
/// [`PUSH_RECORD_LIST`]. Group-key operations answer with the existing key,
/// or a key derived from the group name on create.
#[derive(Clone)]
pub struct RecordingProvider<Q: CommandQueue> {
    pub queue: Q,
}

impl<Q: CommandQueue> RecordingProvider<Q> {
    async fn record(&self, entry: serde_json::Value) -> Result<(), DispatcherError> {
        self.queue.push(PUSH_RECORD_LIST, &entry.to_string()).await
    }
}

impl<Q: CommandQueue> ApnsPort for RecordingProvider<Q> {
    async fn push(
        &self,
        token: &str,
        notification: &ApnsNotification,
    ) -> Result<(), DispatcherError> {
        self.record(json!({
            "provider": "apns",
            "token": token,
            "notification": notification,
        }))
        .await
    }
}

impl<Q: CommandQueue> AndroidPushPort for RecordingProvider<Q> {
    async fn send(&self, push: &AndroidPush) -> Result<(), DispatcherError> {
        self.record(json!({
            "provider": "fcm",
            "to": push.target.as_str(),
            "data": push.data,
        }))
        .await
    }
}

impl<Q: CommandQueue> GroupKeyProvider for RecordingProvider<Q> {
    async fn perform(&self, op: &GroupKeyOperation) -> Result<String, DispatcherError> {
        self.record(json!({
            "provider": "fcm",
            "group_operation": op,
        }))
        .await?;
        Ok(op
            .notification_key
            .clone()
            .unwrap_or_else(|| format!("recorded:{}", op.notification_key_name)))
    }
}
