use futures::future::join_all;
use serde_json::Value;

use crate::domain::repository::{
    AndroidPushPort, ApnsPort, DeviceRepository, EventSink, GroupKeyRepository,
};
use crate::domain::types::{
    AndroidPush, ApnsNotification, Device, Notification, NotifyCommand, Platform, PushTarget,
    TelemetryAction, TelemetryEvent,
};
use crate::error::DispatcherError;
use crate::usecase::registry::DeviceRegistry;

/// Outcome counts for one notify call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliverySummary {
    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Fans a notification out to every device of a user.
///
/// Individual delivery failures are logged and counted; they never fail the
/// call or stop delivery to the remaining devices.
pub struct NotifyUseCase<D, G, S, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    S: ApnsPort,
    A: AndroidPushPort,
    E: EventSink,
{
    pub registry: DeviceRegistry<D>,
    pub group_keys: G,
    pub apns: S,
    pub android: A,
    pub events: E,
}

impl<D, G, S, A, E> NotifyUseCase<D, G, S, A, E>
where
    D: DeviceRepository,
    G: GroupKeyRepository,
    S: ApnsPort,
    A: AndroidPushPort,
    E: EventSink,
{
    pub async fn execute(&self, command: &NotifyCommand) -> Result<DeliverySummary, DispatcherError> {
        let notification = command.validate()?;
        let devices = self.registry.find_for_user(notification.user_id).await?;
        if devices.is_empty() {
            tracing::debug!(user_id = notification.user_id, "no devices to notify");
            return Ok(DeliverySummary::default());
        }

        let (android, ios): (Vec<Device>, Vec<Device>) = devices
            .into_iter()
            .partition(|d| d.platform == Platform::Android);

        let mut summary = DeliverySummary::default();
        let (ios_results, android_results) = futures::join!(
            self.notify_ios(&notification, &ios),
            self.notify_android(&notification, &android),
        );
        for ok in ios_results.into_iter().chain(android_results) {
            summary.record(ok);
        }

        tracing::info!(
            user_id = notification.user_id,
            delivered = summary.delivered,
            failed = summary.failed,
            "notification dispatched"
        );
        Ok(summary)
    }

    async fn notify_ios(&self, notification: &Notification, devices: &[Device]) -> Vec<bool> {
        if devices.is_empty() {
            return Vec::new();
        }
        let push = &ApnsNotification::alert(&notification.message, notification.payload.clone());
        join_all(devices.iter().map(|device| async move {
            let ok = match self.apns.push(&device.token, push).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        user_id = device.user_id,
                        device_id = device.id,
                        error = %e,
                        "ios push failed"
                    );
                    false
                }
            };
            self.emit(notification.user_id, Platform::Ios, ok).await;
            ok
        }))
        .await
    }

    async fn notify_android(&self, notification: &Notification, devices: &[Device]) -> Vec<bool> {
        if devices.is_empty() {
            return Vec::new();
        }
        let data = notification
            .extra
            .clone()
            .unwrap_or_else(|| notification.payload.clone());

        if notification.include_notification_key {
            match self.group_keys.find(notification.user_id).await {
                Ok(Some(record)) if !record.notification_key.is_empty() => {
                    let push = AndroidPush {
                        data: with_notification_key(data, &record.notification_key),
                        target: PushTarget::NotificationKey(record.notification_key),
                    };
                    return vec![self.send_android(notification.user_id, &push).await];
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    user_id = notification.user_id,
                    error = %e,
                    "notification key lookup failed, sending per device"
                ),
            }
        }

        join_all(devices.iter().map(|device| {
            let push = AndroidPush {
                target: PushTarget::Token(device.token.clone()),
                data: data.clone(),
            };
            async move { self.send_android(notification.user_id, &push).await }
        }))
        .await
    }

    async fn send_android(&self, user_id: i64, push: &AndroidPush) -> bool {
        let ok = match self.android.send(push).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "android push failed");
                false
            }
        };
        self.emit(user_id, Platform::Android, ok).await;
        ok
    }

    async fn emit(&self, user_id: i64, platform: Platform, successful: bool) {
        self.events
            .publish(&TelemetryEvent {
                user_id,
                action: TelemetryAction::Notify,
                platform,
                successful,
            })
            .await;
    }
}

/// Adds `notification_key` to the data message. Non-object data is nested
/// under `payload`.
pub fn with_notification_key(data: Value, key: &str) -> Value {
    match data {
        Value::Object(mut map) => {
            map.insert("notification_key".to_owned(), Value::String(key.to_owned()));
            Value::Object(map)
        }
        other => serde_json::json!({ "payload": other, "notification_key": key }),
    }
}
