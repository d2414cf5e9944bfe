use chrono::Utc;

use crate::domain::repository::DeviceRepository;
use crate::domain::types::{Device, DeviceCommand, DeviceKey, InsertOutcome, SubscribeOutcome};
use crate::error::DispatcherError;

/// Durable set of `(user, token, platform)` registrations.
///
/// At most one row exists per `(user_id, token)`. Concurrent subscribes for
/// the same pair converge on that row through the unique index.
pub struct DeviceRegistry<D: DeviceRepository> {
    pub devices: D,
}

impl<D: DeviceRepository> DeviceRegistry<D> {
    /// Create the device, or refresh `updated_at` when it already exists.
    pub async fn subscribe(
        &self,
        command: &DeviceCommand,
    ) -> Result<SubscribeOutcome, DispatcherError> {
        self.subscribe_key(&command.validate()?).await
    }

    pub async fn subscribe_key(&self, key: &DeviceKey) -> Result<SubscribeOutcome, DispatcherError> {
        let now = Utc::now();

        if self.devices.touch(key.user_id, &key.token, now).await? > 0 {
            return self.existing(key.user_id, &key.token).await.map(SubscribeOutcome::Updated);
        }

        match self.devices.insert(key, now).await? {
            InsertOutcome::Created(device) => Ok(SubscribeOutcome::Created(device)),
            InsertOutcome::AlreadyExists => {
                // Lost the insert race; the winner's row is current enough.
                self.existing(key.user_id, &key.token)
                    .await
                    .map(SubscribeOutcome::Updated)
            }
        }
    }

    /// Remove the device. Returns the removed row, `None` if it was absent.
    pub async fn unsubscribe(
        &self,
        command: &DeviceCommand,
    ) -> Result<Option<Device>, DispatcherError> {
        self.unsubscribe_key(&command.validate()?).await
    }

    pub async fn unsubscribe_key(&self, key: &DeviceKey) -> Result<Option<Device>, DispatcherError> {
        let Some(device) = self.devices.find(key.user_id, &key.token).await? else {
            return Ok(None);
        };
        let removed = self.devices.delete(key.user_id, &key.token).await?;
        Ok((removed > 0).then_some(device))
    }

    pub async fn find(&self, user_id: i64, token: &str) -> Result<Option<Device>, DispatcherError> {
        self.devices.find(user_id, token).await
    }

    pub async fn find_for_user(&self, user_id: i64) -> Result<Vec<Device>, DispatcherError> {
        self.devices.find_for_user(user_id).await
    }

    async fn existing(&self, user_id: i64, token: &str) -> Result<Device, DispatcherError> {
        self.devices.find(user_id, token).await?.ok_or_else(|| {
            DispatcherError::Internal(anyhow::anyhow!(
                "device ({user_id}, {token}) vanished during subscribe"
            ))
        })
    }
}
