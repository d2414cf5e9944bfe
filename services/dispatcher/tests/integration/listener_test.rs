use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use yodel_dispatcher::domain::repository::CommandHandler;
use yodel_dispatcher::domain::types::{
    Command, CommandKind, NOTIFY_QUEUE, Platform, SUBSCRIBE_QUEUE, UNSUBSCRIBE_QUEUE,
};
use yodel_dispatcher::error::DispatcherError;
use yodel_dispatcher::listener::{Delivery, QueueBinding, QueueListener, default_bindings};

use crate::helpers::{MockQueue, TestGateway, test_gateway};

fn listener(queue: &MockQueue, gateway: &TestGateway) -> QueueListener<MockQueue, TestGateway> {
    QueueListener::new(queue.clone(), gateway.clone(), default_bindings())
        .unwrap()
        .with_retry_delay(Duration::ZERO)
}

/// Handler that panics on notify and counts everything it sees.
#[derive(Clone, Default)]
struct Flaky {
    seen: Arc<AtomicUsize>,
}

impl CommandHandler for Flaky {
    async fn handle(&self, command: Command) -> Result<(), DispatcherError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        match command {
            Command::Notify(_) => panic!("provider exploded"),
            Command::Unsubscribe(_) => Err(anyhow::anyhow!("unsubscribe failed").into()),
            Command::Subscribe(_) => Ok(()),
        }
    }
}

#[tokio::test]
async fn should_skip_malformed_payload_and_keep_listening() {
    let queue = MockQueue::empty();
    queue
        .message(SUBSCRIBE_QUEUE, "{not json")
        .message(
            SUBSCRIBE_QUEUE,
            &json!({"user_id": 5, "token": "sample", "platform": "ios"}).to_string(),
        );
    let gateway = test_gateway();
    let devices = gateway.devices.devices_handle();
    let listener = listener(&queue, &gateway);

    assert_eq!(listener.next().await, Delivery::Undecodable(CommandKind::Subscribe));
    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Subscribe));

    let devices = devices.lock().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].token, "sample");
}

#[tokio::test]
async fn should_skip_reply_that_is_not_a_pair() {
    let queue = MockQueue::empty();
    queue.malformed("Int(3)");
    let listener = listener(&queue, &test_gateway());

    assert_eq!(listener.next().await, Delivery::Malformed);
    assert_eq!(queue.remaining(), 0);
}

#[tokio::test]
async fn should_drop_message_from_unbound_queue() {
    let queue = MockQueue::empty();
    queue.message("yodel:elsewhere", "{}");
    let listener = listener(&queue, &test_gateway());

    assert_eq!(
        listener.next().await,
        Delivery::UnknownQueue("yodel:elsewhere".to_owned())
    );
}

#[tokio::test]
async fn should_survive_transport_error() {
    let queue = MockQueue::empty();
    queue.broken().message(
        SUBSCRIBE_QUEUE,
        &json!({"user_id": 5, "token": "sample", "platform": 2}).to_string(),
    );
    let gateway = test_gateway();
    let devices = gateway.devices.devices_handle();
    let listener = listener(&queue, &gateway);

    assert_eq!(listener.next().await, Delivery::TransportError);
    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Subscribe));
    assert_eq!(devices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_report_invalid_command_as_failed() {
    let queue = MockQueue::empty();
    queue.message(
        SUBSCRIBE_QUEUE,
        &json!({"user_id": 5, "token": "", "platform": "ios"}).to_string(),
    );
    let gateway = test_gateway();
    let devices = gateway.devices.devices_handle();
    let listener = listener(&queue, &gateway);

    assert_eq!(listener.next().await, Delivery::Failed(CommandKind::Subscribe));
    assert!(devices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_contain_handler_errors_and_panics() {
    let queue = MockQueue::empty();
    queue
        .message(NOTIFY_QUEUE, &json!({"user_id": 5, "message": "hi", "payload": {}}).to_string())
        .message(UNSUBSCRIBE_QUEUE, &json!({"user_id": 5, "token": "t"}).to_string())
        .message(SUBSCRIBE_QUEUE, &json!({"user_id": 5, "token": "t"}).to_string());
    let handler = Flaky::default();
    let seen = Arc::clone(&handler.seen);
    let listener = QueueListener::new(queue.clone(), handler, default_bindings()).unwrap();

    assert_eq!(listener.next().await, Delivery::Failed(CommandKind::Notify));
    assert_eq!(listener.next().await, Delivery::Failed(CommandKind::Unsubscribe));
    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Subscribe));
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn should_reject_empty_or_duplicate_bindings() {
    let queue = MockQueue::empty();

    let empty = QueueListener::new(queue.clone(), test_gateway(), vec![]);
    assert!(matches!(empty, Err(DispatcherError::Config(_))));

    let blank = QueueListener::new(
        queue.clone(),
        test_gateway(),
        vec![QueueBinding::new("  ", CommandKind::Notify)],
    );
    assert!(matches!(blank, Err(DispatcherError::Config(_))));

    let duplicate = QueueListener::new(
        queue,
        test_gateway(),
        vec![
            QueueBinding::new(SUBSCRIBE_QUEUE, CommandKind::Subscribe),
            QueueBinding::new(SUBSCRIBE_QUEUE, CommandKind::Unsubscribe),
        ],
    );
    assert!(matches!(duplicate, Err(DispatcherError::Config(_))));
}

#[tokio::test]
async fn should_listen_on_custom_bindings() {
    let queue = MockQueue::empty();
    queue.message(
        "custom:notify",
        &json!({"user_id": 5, "message": "hi", "payload": {}}).to_string(),
    );
    let listener = QueueListener::new(
        queue.clone(),
        test_gateway(),
        vec![QueueBinding::new("custom:notify", CommandKind::Notify)],
    )
    .unwrap();

    assert_eq!(listener.queues(), ["custom:notify".to_owned()]);
    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Notify));
}

#[tokio::test]
async fn should_subscribe_notify_and_unsubscribe_end_to_end() {
    let device = json!({"user_id": 5, "token": "sample", "platform": "ios"}).to_string();
    let queue = MockQueue::empty();
    queue
        .message(SUBSCRIBE_QUEUE, &device)
        .message(
            NOTIFY_QUEUE,
            &json!({
                "user_id": 5,
                "message": "Sample message",
                "payload": {"other": "attribute"}
            })
            .to_string(),
        )
        .message(UNSUBSCRIBE_QUEUE, &device);
    let gateway = test_gateway();
    let devices = gateway.devices.devices_handle();
    let pushes = gateway.apns.pushes_handle();
    let listener = listener(&queue, &gateway);

    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Subscribe));
    {
        let devices = devices.lock().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].platform, Platform::Ios);
    }

    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Notify));
    {
        let pushes = pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "sample");
        assert_eq!(pushes[0].1.badge, 1);
        assert_eq!(pushes[0].1.alert, "Sample message");
        assert_eq!(pushes[0].1.payload, json!({"other": "attribute"}));
    }

    assert_eq!(listener.next().await, Delivery::Handled(CommandKind::Unsubscribe));
    assert!(devices.lock().unwrap().is_empty());
    assert_eq!(queue.remaining(), 0);
}
