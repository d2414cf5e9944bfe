use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use yodel_dispatcher::domain::repository::{CommandQueue, Popped};
use yodel_dispatcher::domain::types::{CommandKind, SUBSCRIBE_QUEUE};
use yodel_dispatcher::infra::queue::RedisCommandQueue;
use yodel_dispatcher::listener::{Delivery, QueueListener, default_bindings};

use crate::helpers::test_gateway;

/// Reads one RESP array command and returns its arguments.
async fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

/// Minimal Redis that answers BLPOP only after `delay`.
async fn slow_redis(delay: Duration, payload: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                while let Some(args) = read_command(&mut reader).await {
                    let reply = if args[0].eq_ignore_ascii_case("BLPOP") {
                        tokio::time::sleep(delay).await;
                        format!(
                            "*2\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
                            args[1].len(),
                            args[1],
                            payload.len(),
                            payload
                        )
                    } else {
                        "+OK\r\n".to_owned()
                    };
                    if reader.get_mut().write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    format!("redis://{addr}")
}

#[tokio::test]
async fn should_wait_for_blpop_longer_than_a_pooled_round_trip() {
    let payload = r#"{"user_id":5,"token":"sample","platform":"ios"}"#;
    let url = slow_redis(Duration::from_millis(800), payload).await;
    let queue = RedisCommandQueue::open(&url).unwrap();

    let popped = tokio::time::timeout(
        Duration::from_secs(5),
        queue.pop(&[SUBSCRIBE_QUEUE.to_owned()]),
    )
    .await
    .expect("pop never returned")
    .unwrap();

    assert_eq!(
        popped,
        Popped::Message {
            queue: SUBSCRIBE_QUEUE.to_owned(),
            payload: payload.to_owned(),
        }
    );
}

#[tokio::test]
async fn should_deliver_message_popped_after_idle_wait() {
    let payload = r#"{"user_id":5,"token":"sample","platform":"ios"}"#;
    let url = slow_redis(Duration::from_millis(800), payload).await;
    let gateway = test_gateway();
    let devices = gateway.devices.devices_handle();
    let listener = QueueListener::new(
        RedisCommandQueue::open(&url).unwrap(),
        gateway,
        default_bindings(),
    )
    .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), listener.next())
        .await
        .expect("listener never delivered");

    assert_eq!(delivery, Delivery::Handled(CommandKind::Subscribe));
    assert_eq!(devices.lock().unwrap()[0].token, "sample");
}

#[tokio::test]
async fn should_reuse_blocking_connection_between_pops() {
    let url = slow_redis(Duration::from_millis(10), "{}").await;
    let queue = RedisCommandQueue::open(&url).unwrap();
    let queues = [SUBSCRIBE_QUEUE.to_owned()];

    for _ in 0..3 {
        let popped = queue.pop(&queues).await.unwrap();
        assert!(matches!(popped, Popped::Message { .. }), "got {popped:?}");
    }
}

#[tokio::test]
async fn should_report_unreachable_redis_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let queue = RedisCommandQueue::open(&format!("redis://{addr}")).unwrap();

    let result = queue.pop(&[SUBSCRIBE_QUEUE.to_owned()]).await;

    assert!(
        matches!(result, Err(yodel_dispatcher::error::DispatcherError::Transport(_))),
        "got {result:?}"
    );
}
