use chrono::{Duration, Utc};
use serde_json::json;

use yodel_dispatcher::domain::types::{FeedbackBatch, FeedbackEntry, Platform, TelemetryAction};
use yodel_dispatcher::infra::apns::ChannelFeedbackSource;

use crate::helpers::{
    MockAndroid, MockApns, MockDeviceRepo, MockGroupKeyProvider, MockGroupKeyRepo, device,
    gateway_with,
};

fn entry(token: &str, offset: Duration) -> FeedbackEntry {
    FeedbackEntry {
        token: token.to_owned(),
        failed_at: Utc::now() + offset,
    }
}

#[tokio::test]
async fn should_remove_device_that_failed_after_last_update() {
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![
            device(1, 5, "stale", Platform::Ios),
            device(2, 5, "fresh", Platform::Ios),
        ]),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();
    let events = gateway.events.events_handle();

    let removed = gateway
        .feedback()
        .process(vec![entry("stale", Duration::hours(1))].into())
        .await
        .unwrap();

    assert_eq!(removed, 1);
    let devices = devices.lock().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].token, "fresh");
    let events = events.lock().unwrap();
    assert_eq!(events[0].action, TelemetryAction::DeleteDevice);
    assert!(events[0].successful);
}

#[tokio::test]
async fn should_keep_device_updated_after_failure() {
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![device(1, 5, "resubscribed", Platform::Ios)]),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();

    let removed = gateway
        .feedback()
        .process(entry("resubscribed", -Duration::hours(1)).into())
        .await
        .unwrap();

    assert_eq!(removed, 0);
    assert_eq!(devices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_do_nothing_for_empty_batch() {
    let gateway = gateway_with(
        MockDeviceRepo::failing(),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );

    let removed = gateway
        .feedback()
        .process(FeedbackBatch::Many(vec![]))
        .await
        .unwrap();

    assert_eq!(removed, 0, "empty batch must not touch the store");
}

#[tokio::test]
async fn should_accept_single_entry_from_wire_format() {
    let failed_at = (Utc::now() + Duration::hours(1)).timestamp_millis();
    let batch: FeedbackBatch =
        serde_json::from_value(json!({"token": "stale", "failedAt": failed_at})).unwrap();
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![device(1, 5, "stale", Platform::Android)]),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();

    let removed = gateway.feedback().process(batch).await.unwrap();

    assert_eq!(removed, 1);
    assert!(devices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_remove_every_user_sharing_a_failed_token() {
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![
            device(1, 5, "shared", Platform::Ios),
            device(2, 6, "shared", Platform::Ios),
        ]),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();

    let removed = gateway
        .feedback()
        .process(vec![entry("shared", Duration::hours(1))].into())
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert!(devices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_continue_after_group_sync_failure() {
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![
            device(1, 5, "reg-a", Platform::Android),
            device(2, 6, "ios-a", Platform::Ios),
        ]),
        MockGroupKeyRepo::new(vec![crate::helpers::group_key(5, "key-0", "user_5_abcdefghij")]),
        MockGroupKeyProvider::failing(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();

    let removed = gateway
        .feedback()
        .process(
            vec![
                entry("reg-a", Duration::hours(1)),
                entry("ios-a", Duration::hours(1)),
            ]
            .into(),
        )
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert!(devices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_drain_channel_until_closed() {
    let gateway = gateway_with(
        MockDeviceRepo::new(vec![device(1, 5, "stale", Platform::Ios)]),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(entry("stale", Duration::hours(1))).unwrap();
    drop(tx);

    gateway.feedback().run(ChannelFeedbackSource::new(rx)).await;

    assert!(devices.lock().unwrap().is_empty());
}
