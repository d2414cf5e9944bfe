#![allow(async_fn_in_trait)]

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::domain::types::{
    AndroidPush, ApnsNotification, Command, Device, DeviceKey, FeedbackBatch, FeedbackEntry,
    GroupKeyOperation, GroupKeyRecord, InsertOutcome, TelemetryEvent,
};
use crate::error::DispatcherError;

// ── Storage ──────────────────────────────────────────────────────────────────

/// Repository for registered devices.
pub trait DeviceRepository: Send + Sync {
    /// Bump `updated_at` on the `(user_id, token)` row. Returns rows affected.
    async fn touch(
        &self,
        user_id: i64,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DispatcherError>;

    /// Insert a new device. A unique violation on `(user_id, token)` is
    /// reported as [`InsertOutcome::AlreadyExists`], not as an error.
    async fn insert(
        &self,
        key: &DeviceKey,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, DispatcherError>;

    /// Delete the `(user_id, token)` row. Returns rows affected.
    async fn delete(&self, user_id: i64, token: &str) -> Result<u64, DispatcherError>;

    async fn find(&self, user_id: i64, token: &str) -> Result<Option<Device>, DispatcherError>;

    async fn find_for_user(&self, user_id: i64) -> Result<Vec<Device>, DispatcherError>;

    /// Devices whose token matches an entry and whose `updated_at` is strictly
    /// older than that entry's failure time.
    async fn find_stale(&self, entries: &[FeedbackEntry]) -> Result<Vec<Device>, DispatcherError>;

    /// Highest device id, `None` when the table is empty.
    async fn max_id(&self) -> Result<Option<i64>, DispatcherError>;
}

/// Repository for per-user group-key records.
pub trait GroupKeyRepository: Send + Sync {
    async fn find(&self, user_id: i64) -> Result<Option<GroupKeyRecord>, DispatcherError>;

    /// Insert the record, or overwrite key/name if the user already has one.
    async fn upsert(&self, record: &GroupKeyRecord) -> Result<(), DispatcherError>;

    /// Store a new key for the user. Returns rows affected.
    async fn update_key(
        &self,
        user_id: i64,
        notification_key: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DispatcherError>;
}

// ── Providers ────────────────────────────────────────────────────────────────

/// Provider-side device-group management.
pub trait GroupKeyProvider: Send + Sync {
    /// Perform the operation and return the resulting notification key.
    async fn perform(&self, op: &GroupKeyOperation) -> Result<String, DispatcherError>;
}

/// iOS push delivery.
pub trait ApnsPort: Send + Sync {
    async fn push(&self, token: &str, notification: &ApnsNotification)
    -> Result<(), DispatcherError>;
}

/// Android data-message delivery.
pub trait AndroidPushPort: Send + Sync {
    async fn send(&self, push: &AndroidPush) -> Result<(), DispatcherError>;
}

/// Fire-and-forget telemetry. Implementations swallow and log their own
/// failures.
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &TelemetryEvent);
}

/// Source of provider feedback. `None` means the source is exhausted.
pub trait FeedbackSource: Send {
    async fn next_batch(&mut self) -> Option<FeedbackBatch>;
}

// ── Queue ────────────────────────────────────────────────────────────────────

/// One pop from the command queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    Message { queue: String, payload: String },
    /// The reply could not be read as a `(queue, payload)` pair.
    Malformed(String),
}

/// Blocking list queue. Futures are `Send` so HTTP handlers stay generic.
pub trait CommandQueue: Clone + Send + Sync + 'static {
    /// Block until a message is available on any of `queues`.
    fn pop(&self, queues: &[String]) -> impl Future<Output = Result<Popped, DispatcherError>> + Send;

    fn push(
        &self,
        queue: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), DispatcherError>> + Send;

    fn incr(&self, key: &str) -> impl Future<Output = Result<i64, DispatcherError>> + Send;
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Executes a decoded command.
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Result<(), DispatcherError>;
}
