use anyhow::Context as _;

use crate::domain::repository::CommandQueue;
use crate::domain::types::{CommandKind, DeviceCommand, DeviceKey};
use crate::error::DispatcherError;

/// Validates a device command and pushes it onto its queue.
pub struct EnqueueDeviceUseCase<Q: CommandQueue> {
    pub queue: Q,
}

impl<Q: CommandQueue> EnqueueDeviceUseCase<Q> {
    pub async fn execute(
        &self,
        kind: CommandKind,
        command: &DeviceCommand,
    ) -> Result<DeviceKey, DispatcherError> {
        let key = command.validate()?;
        let payload = serde_json::to_string(command).context("encode device command")?;
        self.queue.push(kind.queue_name(), &payload).await?;
        tracing::debug!(user_id = key.user_id, queue = kind.queue_name(), "command enqueued");
        Ok(key)
    }
}
