use std::sync::Arc;

use deadpool_redis::Pool;
use deadpool_redis::redis::aio::MultiplexedConnection;
use deadpool_redis::redis::{self, AsyncCommands, AsyncConnectionConfig, Value};
use tokio::sync::Mutex;

use crate::domain::repository::{CommandQueue, Popped};
use crate::error::DispatcherError;

/// Redis lists as the command queue.
///
/// Pushes and counters go through the pool. BLPOP runs on its own
/// multiplexed connection with no client-side response timeout: a pop cut
/// off client-side loses the message the server has already removed.
///
/// `block_timeout` is the server-side BLPOP timeout in seconds; `0` blocks
/// until a message arrives. A timed-out BLPOP is simply reissued.
#[derive(Clone)]
pub struct RedisCommandQueue {
    pub pool: Pool,
    pub block_timeout: f64,
    client: redis::Client,
    blocking: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisCommandQueue {
    pub fn new(pool: Pool, client: redis::Client) -> Self {
        Self {
            pool,
            block_timeout: 0.0,
            client,
            blocking: Arc::new(Mutex::new(None)),
        }
    }

    /// Pool and blocking client for one Redis URL. Nothing connects yet.
    pub fn open(url: &str) -> Result<Self, DispatcherError> {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| DispatcherError::Config(format!("redis pool: {e}")))?;
        let client = redis::Client::open(url)
            .map_err(|e| DispatcherError::Config(format!("redis url: {e}")))?;
        Ok(Self::new(pool, client))
    }

    pub fn with_block_timeout(mut self, seconds: f64) -> Self {
        self.block_timeout = seconds;
        self
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, DispatcherError> {
        self.pool.get().await.map_err(DispatcherError::transport)
    }

    async fn blocking_conn(&self) -> Result<MultiplexedConnection, DispatcherError> {
        let mut slot = self.blocking.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let config = AsyncConnectionConfig::new().set_response_timeout(None);
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(DispatcherError::transport)?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_blocking(&self) {
        self.blocking.lock().await.take();
    }
}

impl CommandQueue for RedisCommandQueue {
    async fn pop(&self, queues: &[String]) -> Result<Popped, DispatcherError> {
        let mut cmd = redis::cmd("BLPOP");
        for queue in queues {
            cmd.arg(queue.as_str());
        }
        cmd.arg(self.block_timeout);

        let mut conn = self.blocking_conn().await?;
        loop {
            let reply: Value = match cmd.query_async(&mut conn).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.reset_blocking().await;
                    return Err(DispatcherError::transport(e));
                }
            };
            if let Value::Nil = reply {
                continue;
            }
            return Ok(decode_pop(reply));
        }
    }

    async fn push(&self, queue: &str, payload: &str) -> Result<(), DispatcherError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .rpush(queue, payload)
            .await
            .map_err(DispatcherError::transport)?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, DispatcherError> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1)
            .await
            .map_err(DispatcherError::transport)
    }
}

/// A BLPOP reply must be a two-element array of strings.
pub fn decode_pop(reply: Value) -> Popped {
    if let Value::Array(items) = &reply {
        if let [queue, payload] = items.as_slice() {
            if let (Some(queue), Some(payload)) = (as_string(queue), as_string(payload)) {
                return Popped::Message { queue, payload };
            }
        }
    }
    Popped::Malformed(format!("{reply:?}"))
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}
