use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::domain::repository::{CommandHandler, CommandQueue, Popped};
use crate::domain::types::CommandKind;
use crate::error::DispatcherError;

/// Pause after a failed dequeue before trying again.
pub const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A queue name and the kind of command it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub kind: CommandKind,
}

impl QueueBinding {
    pub fn new(queue: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            queue: queue.into(),
            kind,
        }
    }
}

/// The three well-known queues.
pub fn default_bindings() -> Vec<QueueBinding> {
    [
        CommandKind::Subscribe,
        CommandKind::Unsubscribe,
        CommandKind::Notify,
    ]
    .into_iter()
    .map(|kind| QueueBinding::new(kind.queue_name(), kind))
    .collect()
}

/// What happened to one dequeued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled(CommandKind),
    /// The handler returned an error or panicked.
    Failed(CommandKind),
    /// The dequeue reply was not a `(queue, payload)` pair.
    Malformed,
    /// The payload was not valid JSON for the bound command.
    Undecodable(CommandKind),
    /// The reply named a queue this listener is not bound to.
    UnknownQueue(String),
    /// The dequeue itself failed.
    TransportError,
}

/// Drains the bound queues and routes each message to its handler.
///
/// Messages are handled one at a time and at most once. Nothing a message
/// does can stop the loop.
pub struct QueueListener<Q, H>
where
    Q: CommandQueue,
    H: CommandHandler,
{
    queue: Q,
    handler: H,
    routes: HashMap<String, CommandKind>,
    queues: Vec<String>,
    retry_delay: Duration,
}

impl<Q, H> QueueListener<Q, H>
where
    Q: CommandQueue,
    H: CommandHandler,
{
    /// The binding set is fixed for the listener's lifetime. Empty, blank or
    /// duplicated queue names are rejected here rather than at dispatch time.
    pub fn new(queue: Q, handler: H, bindings: Vec<QueueBinding>) -> Result<Self, DispatcherError> {
        if bindings.is_empty() {
            return Err(DispatcherError::Config("listener has no queues bound".to_owned()));
        }
        let mut routes = HashMap::with_capacity(bindings.len());
        let mut queues = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if binding.queue.trim().is_empty() {
                return Err(DispatcherError::Config("blank queue name".to_owned()));
            }
            if routes.insert(binding.queue.clone(), binding.kind).is_some() {
                return Err(DispatcherError::Config(format!(
                    "queue {} bound twice",
                    binding.queue
                )));
            }
            queues.push(binding.queue);
        }
        Ok(Self {
            queue,
            handler,
            routes,
            queues,
            retry_delay: TRANSPORT_RETRY_DELAY,
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Loop forever.
    pub async fn listen(&self) {
        tracing::info!(queues = ?self.queues, "listening");
        loop {
            self.next().await;
        }
    }

    /// Take one message and handle it.
    pub async fn next(&self) -> Delivery {
        let (queue, payload) = match self.queue.pop(&self.queues).await {
            Ok(Popped::Message { queue, payload }) => (queue, payload),
            Ok(Popped::Malformed(reply)) => {
                tracing::error!(reply = %reply, "unexpected dequeue reply");
                return Delivery::Malformed;
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "dequeue failed");
                tokio::time::sleep(self.retry_delay).await;
                return Delivery::TransportError;
            }
        };

        let Some(&kind) = self.routes.get(&queue) else {
            tracing::error!(queue = %queue, "message from unbound queue");
            return Delivery::UnknownQueue(queue);
        };

        let command = match kind.parse(&payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "undecodable payload dropped");
                return Delivery::Undecodable(kind);
            }
        };

        match AssertUnwindSafe(self.handler.handle(command))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                tracing::debug!(queue = %queue, "command handled");
                Delivery::Handled(kind)
            }
            Ok(Err(e)) => {
                tracing::error!(queue = %queue, error = %e, kind = e.kind(), "command failed");
                Delivery::Failed(kind)
            }
            Err(_) => {
                tracing::error!(queue = %queue, "command handler panicked");
                Delivery::Failed(kind)
            }
        }
    }
}
