use crate::domain::repository::{
    AndroidPushPort, DeviceRepository, EventSink, GroupKeyProvider, GroupKeyRepository,
};
use crate::domain::types::{
    Device, DeviceCommand, DeviceKey, Platform, SubscribeOutcome, TelemetryAction, TelemetryEvent,
};
use crate::error::DispatcherError;
use crate::usecase::group_key::GroupKeyManager;
use crate::usecase::registry::DeviceRegistry;

fn event(key: &DeviceKey, action: TelemetryAction, successful: bool) -> TelemetryEvent {
    TelemetryEvent {
        user_id: key.user_id,
        action,
        platform: key.platform,
        successful,
    }
}

// ── Subscribe ────────────────────────────────────────────────────────────────

/// Registry write, then group-key sync for Android, then telemetry.
///
/// A group-key failure is logged and marks the event unsuccessful but never
/// undoes the registry write.
pub struct SubscribeUseCase<D, G, P, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
    E: EventSink,
{
    pub registry: DeviceRegistry<D>,
    pub group_keys: GroupKeyManager<G, P, A>,
    pub events: E,
}

impl<D, G, P, A, E> SubscribeUseCase<D, G, P, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
    E: EventSink,
{
    pub async fn execute(
        &self,
        command: &DeviceCommand,
    ) -> Result<SubscribeOutcome, DispatcherError> {
        let key = command.validate()?;

        let outcome = match self.registry.subscribe_key(&key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.events
                    .publish(&event(&key, TelemetryAction::CreateDevice, false))
                    .await;
                return Err(e);
            }
        };

        let mut successful = true;
        if key.platform == Platform::Android {
            if let Err(e) = self
                .group_keys
                .on_subscribe(key.user_id, &key.token, command.wants_notification_key())
                .await
            {
                tracing::warn!(
                    user_id = key.user_id,
                    error = %e,
                    kind = e.kind(),
                    "notification key sync failed on subscribe"
                );
                successful = false;
            }
        }

        self.events
            .publish(&event(&key, outcome.action(), successful))
            .await;
        tracing::info!(
            user_id = key.user_id,
            platform = %key.platform,
            action = ?outcome.action(),
            "device subscribed"
        );
        Ok(outcome)
    }
}

// ── Unsubscribe ──────────────────────────────────────────────────────────────

/// Registry delete, then group-key REMOVE for Android, then telemetry.
/// Unsubscribing an unknown device is a silent no-op.
pub struct UnsubscribeUseCase<D, G, P, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
    E: EventSink,
{
    pub registry: DeviceRegistry<D>,
    pub group_keys: GroupKeyManager<G, P, A>,
    pub events: E,
}

impl<D, G, P, A, E> UnsubscribeUseCase<D, G, P, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
    E: EventSink,
{
    pub async fn execute(&self, command: &DeviceCommand) -> Result<Option<Device>, DispatcherError> {
        let key = command.validate()?;

        let removed = match self.registry.unsubscribe_key(&key).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::debug!(user_id = key.user_id, "unsubscribe for unknown device");
                return Ok(None);
            }
            Err(e) => {
                self.events
                    .publish(&event(&key, TelemetryAction::DeleteDevice, false))
                    .await;
                return Err(e);
            }
        };

        // The stored platform wins over whatever the producer claimed.
        let key = DeviceKey {
            platform: removed.platform,
            ..key
        };

        let mut successful = true;
        if key.platform == Platform::Android {
            if let Err(e) = self.group_keys.on_unsubscribe(key.user_id, &key.token).await {
                tracing::warn!(
                    user_id = key.user_id,
                    error = %e,
                    kind = e.kind(),
                    "notification key sync failed on unsubscribe"
                );
                successful = false;
            }
        }

        self.events
            .publish(&event(&key, TelemetryAction::DeleteDevice, successful))
            .await;
        tracing::info!(user_id = key.user_id, platform = %key.platform, "device unsubscribed");
        Ok(Some(removed))
    }
}
