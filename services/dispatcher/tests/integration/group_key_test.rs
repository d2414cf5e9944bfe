use serde_json::json;

use yodel_dispatcher::domain::types::{
    DeviceCommand, GroupKeyOperationType, Platform, PushTarget,
};

use crate::helpers::{
    MockAndroid, MockApns, MockDeviceRepo, MockGroupKeyProvider, MockGroupKeyRepo, device,
    gateway_with, group_key, test_gateway,
};

#[tokio::test]
async fn should_create_group_on_first_android_subscribe() {
    let gateway = test_gateway();
    let operations = gateway.group_key_provider.operations_handle();
    let records = gateway.group_keys.records_handle();

    gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await
        .unwrap();

    let operations = operations.lock().unwrap();
    assert_eq!(operations.len(), 1);
    let op = &operations[0];
    assert_eq!(op.operation_type, GroupKeyOperationType::Create);
    assert!(op.notification_key_name.starts_with("user_7_"));
    assert_eq!(op.notification_key, None);
    assert_eq!(op.registration_ids, vec!["reg-1"]);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, 7);
    assert_eq!(records[0].notification_key, "key-1");
    assert_eq!(records[0].notification_key_name, op.notification_key_name);
}

#[tokio::test]
async fn should_add_to_existing_group_on_second_android_subscribe() {
    let gateway = test_gateway();
    let operations = gateway.group_key_provider.operations_handle();
    let records = gateway.group_keys.records_handle();

    gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await
        .unwrap();
    gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "reg-2", Platform::Android))
        .await
        .unwrap();

    let operations = operations.lock().unwrap();
    assert_eq!(operations.len(), 2);
    let add = &operations[1];
    assert_eq!(add.operation_type, GroupKeyOperationType::Add);
    assert_eq!(add.notification_key_name, operations[0].notification_key_name);
    assert_eq!(add.notification_key.as_deref(), Some("key-1"));
    assert_eq!(add.registration_ids, vec!["reg-2"]);
    assert!(add.recreate_key_if_missing);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1, "one record per user");
    assert_eq!(records[0].notification_key, "key-2", "rotated key is stored");
}

#[tokio::test]
async fn should_leave_ios_devices_out_of_groups() {
    let gateway = test_gateway();
    let operations = gateway.group_key_provider.operations_handle();

    gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "ios-token", Platform::Ios))
        .await
        .unwrap();

    assert!(operations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_recreate_with_stored_name_when_key_is_empty() {
    let group_keys = MockGroupKeyRepo::new(vec![group_key(7, "", "user_7_keepthis00")]);
    let gateway = gateway_with(
        MockDeviceRepo::empty(),
        group_keys,
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let operations = gateway.group_key_provider.operations_handle();
    let records = gateway.group_keys.records_handle();

    gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await
        .unwrap();

    let operations = operations.lock().unwrap();
    assert_eq!(operations[0].operation_type, GroupKeyOperationType::Create);
    assert_eq!(operations[0].notification_key_name, "user_7_keepthis00");
    assert_eq!(records.lock().unwrap()[0].notification_key, "key-1");
}

#[tokio::test]
async fn should_remove_from_group_on_android_unsubscribe() {
    let devices = MockDeviceRepo::new(vec![device(1, 7, "reg-1", Platform::Android)]);
    let group_keys = MockGroupKeyRepo::new(vec![group_key(7, "key-0", "user_7_abcdefghij")]);
    let gateway = gateway_with(
        devices,
        group_keys,
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let operations = gateway.group_key_provider.operations_handle();
    let records = gateway.group_keys.records_handle();

    let removed = gateway
        .unsubscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await
        .unwrap();

    assert!(removed.is_some());
    let operations = operations.lock().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].operation_type, GroupKeyOperationType::Remove);
    assert_eq!(operations[0].notification_key.as_deref(), Some("key-0"));
    assert_eq!(operations[0].registration_ids, vec!["reg-1"]);
    assert_eq!(records.lock().unwrap()[0].notification_key, "key-1");
}

#[tokio::test]
async fn should_skip_remove_when_user_has_no_group() {
    let devices = MockDeviceRepo::new(vec![device(1, 7, "reg-1", Platform::Android)]);
    let gateway = gateway_with(
        devices,
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::default(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let operations = gateway.group_key_provider.operations_handle();
    let records = gateway.group_keys.records_handle();
    let events = gateway.events.events_handle();

    gateway
        .unsubscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await
        .unwrap();

    assert!(operations.lock().unwrap().is_empty());
    assert!(records.lock().unwrap().is_empty(), "remove never creates a record");
    assert!(events.lock().unwrap()[0].successful);
}

#[tokio::test]
async fn should_keep_device_when_group_provider_fails() {
    let gateway = gateway_with(
        MockDeviceRepo::empty(),
        MockGroupKeyRepo::default(),
        MockGroupKeyProvider::failing(),
        MockApns::default(),
        MockAndroid::default(),
    );
    let devices = gateway.devices.devices_handle();
    let records = gateway.group_keys.records_handle();
    let events = gateway.events.events_handle();

    let result = gateway
        .subscribe()
        .execute(&DeviceCommand::new(7, "reg-1", Platform::Android))
        .await;

    assert!(result.is_ok(), "registry write must not be rolled back");
    assert_eq!(devices.lock().unwrap().len(), 1);
    assert!(records.lock().unwrap().is_empty());
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].successful);
}

#[tokio::test]
async fn should_send_key_to_new_device_when_requested() {
    let gateway = test_gateway();
    let sends = gateway.android.sends_handle();
    let cmd = DeviceCommand {
        send_notification_key: Some(true),
        ..DeviceCommand::new(7, "reg-1", Platform::Android)
    };

    gateway.subscribe().execute(&cmd).await.unwrap();

    let sends = sends.lock().unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].target, PushTarget::Token("reg-1".to_owned()));
    assert_eq!(sends[0].data, json!({"notification_key": "key-1"}));
}
