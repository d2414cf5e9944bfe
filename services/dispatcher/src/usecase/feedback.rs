use crate::domain::repository::{CommandHandler, DeviceRepository, FeedbackSource};
use crate::domain::types::{Command, DeviceCommand, FeedbackBatch};
use crate::error::DispatcherError;

/// Prunes devices the push provider reported as failed.
///
/// A device is only removed when its `updated_at` predates the reported
/// failure, so a device that re-subscribed after the failure survives.
/// Removal goes through the regular unsubscribe path.
pub struct FeedbackReconciler<D, H>
where
    D: DeviceRepository,
    H: CommandHandler,
{
    pub devices: D,
    pub handler: H,
}

impl<D, H> FeedbackReconciler<D, H>
where
    D: DeviceRepository,
    H: CommandHandler,
{
    /// Returns the number of devices unsubscribed.
    pub async fn process(&self, batch: FeedbackBatch) -> Result<usize, DispatcherError> {
        let entries = batch.into_entries();
        if entries.is_empty() {
            return Ok(0);
        }

        let stale = self.devices.find_stale(&entries).await?;
        let mut removed = 0;
        for device in &stale {
            let command = Command::Unsubscribe(DeviceCommand::for_device(device));
            match self.handler.handle(command).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    user_id = device.user_id,
                    device_id = device.id,
                    error = %e,
                    "failed to unsubscribe stale device"
                ),
            }
        }

        tracing::info!(
            reported = entries.len(),
            matched = stale.len(),
            removed,
            "feedback processed"
        );
        Ok(removed)
    }

    /// Drain `source` until it is exhausted.
    pub async fn run<F: FeedbackSource>(&self, mut source: F) {
        while let Some(batch) = source.next_batch().await {
            if let Err(e) = self.process(batch).await {
                tracing::error!(error = %e, kind = e.kind(), "feedback batch failed");
            }
        }
        tracing::info!("feedback source closed");
    }
}
