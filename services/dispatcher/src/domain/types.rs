use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DispatcherError;

/// Queue carrying subscribe commands.
pub const SUBSCRIBE_QUEUE: &str = "yodel:subscribe";
/// Queue carrying unsubscribe commands.
pub const UNSUBSCRIBE_QUEUE: &str = "yodel:unsubscribe";
/// Queue carrying notify commands.
pub const NOTIFY_QUEUE: &str = "yodel:notify";
/// List the recording push provider appends outgoing pushes to.
pub const PUSH_RECORD_LIST: &str = "yodel:push";
/// Counter bumped by the liveness probe.
pub const PING_COUNTER_KEY: &str = "yodel:ping";
/// Pub/sub channel telemetry events are published on.
pub const EVENTS_CHANNEL: &str = "yodel:events";

/// Length of the random suffix in a generated notification key name.
pub const KEY_NAME_SUFFIX_LEN: usize = 10;

// ── Devices ──────────────────────────────────────────────────────────────────

/// Push ecosystem a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Storage code used by the `devices.platform` column.
    pub fn code(self) -> i16 {
        match self {
            Self::Android => 1,
            Self::Ios => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Android),
            2 => Some(Self::Ios),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    /// Accepts the platform name or its storage code. Anything else is unknown.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.as_str() {
                "android" => Some(Self::Android),
                "ios" => Some(Self::Ios),
                _ => None,
            },
            Value::Number(n) => n.as_i64().and_then(Self::from_code),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered endpoint capable of receiving pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated identity of a device: the `(user_id, token)` pair plus platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKey {
    pub user_id: i64,
    pub token: String,
    pub platform: Platform,
}

/// Result of an insert attempt against the unique `(user_id, token)` index.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created(Device),
    /// A concurrent writer inserted the same pair first.
    AlreadyExists,
}

/// What `subscribe` did to the registry.
#[derive(Debug, Clone)]
pub enum SubscribeOutcome {
    Created(Device),
    Updated(Device),
}

impl SubscribeOutcome {
    pub fn device(&self) -> &Device {
        match self {
            Self::Created(d) | Self::Updated(d) => d,
        }
    }

    pub fn action(&self) -> TelemetryAction {
        match self {
            Self::Created(_) => TelemetryAction::CreateDevice,
            Self::Updated(_) => TelemetryAction::UpdateDevice,
        }
    }
}

// ── Group keys ───────────────────────────────────────────────────────────────

/// Provider multicast-group state for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeyRecord {
    pub user_id: i64,
    pub notification_key: String,
    pub notification_key_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKeyOperationType {
    Create,
    Add,
    Remove,
}

/// A device-group management request sent to the group-key provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKeyOperation {
    pub operation_type: GroupKeyOperationType,
    pub notification_key_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_key: Option<String>,
    pub registration_ids: Vec<String>,
    pub recreate_key_if_missing: bool,
}

/// `user_<id>_<suffix>`.
pub fn notification_key_name(user_id: i64, suffix: &str) -> String {
    format!("user_{user_id}_{suffix}")
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Which handler a queue is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    Notify,
}

impl CommandKind {
    /// The well-known queue this kind of command is produced on.
    pub fn queue_name(self) -> &'static str {
        match self {
            Self::Subscribe => SUBSCRIBE_QUEUE,
            Self::Unsubscribe => UNSUBSCRIBE_QUEUE,
            Self::Notify => NOTIFY_QUEUE,
        }
    }

    /// Decode a raw queue payload into this kind of command.
    pub fn parse(self, raw: &str) -> Result<Command, serde_json::Error> {
        Ok(match self {
            Self::Subscribe => Command::Subscribe(serde_json::from_str(raw)?),
            Self::Unsubscribe => Command::Unsubscribe(serde_json::from_str(raw)?),
            Self::Notify => Command::Notify(serde_json::from_str(raw)?),
        })
    }
}

/// A unit of work taken from the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe(DeviceCommand),
    Unsubscribe(DeviceCommand),
    Notify(NotifyCommand),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Subscribe(_) => CommandKind::Subscribe,
            Self::Unsubscribe(_) => CommandKind::Unsubscribe,
            Self::Notify(_) => CommandKind::Notify,
        }
    }
}

/// Subscribe/unsubscribe payload as produced on the queue.
///
/// Fields are kept loosely typed so that a wrong type surfaces as a
/// validation error naming the field rather than as an undecodable message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Value>,
    #[serde(
        default,
        deserialize_with = "loose_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub send_notification_key: Option<bool>,
}

impl DeviceCommand {
    pub fn new(user_id: i64, token: impl Into<String>, platform: Platform) -> Self {
        Self {
            user_id: Some(Value::from(user_id)),
            token: Some(Value::String(token.into())),
            platform: Some(Value::String(platform.as_str().to_owned())),
            send_notification_key: None,
        }
    }

    pub fn for_device(device: &Device) -> Self {
        Self::new(device.user_id, device.token.clone(), device.platform)
    }

    /// Checks `user_id`, `token`, then `platform`, failing on the first
    /// invalid field.
    pub fn validate(&self) -> Result<DeviceKey, DispatcherError> {
        let user_id = parse_user_id(self.user_id.as_ref())?;
        let token = match &self.token {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            _ => return Err(DispatcherError::Validation("token")),
        };
        let platform = self
            .platform
            .as_ref()
            .and_then(Platform::from_value)
            .ok_or(DispatcherError::Validation("platform"))?;
        Ok(DeviceKey {
            user_id,
            token,
            platform,
        })
    }

    pub fn wants_notification_key(&self) -> bool {
        self.send_notification_key.unwrap_or(false)
    }
}

/// Notify payload as produced on the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(
        default,
        deserialize_with = "loose_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_notification_key: Option<bool>,
}

/// A validated notify command.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub user_id: i64,
    pub message: String,
    pub payload: Value,
    pub extra: Option<Value>,
    pub include_notification_key: bool,
}

impl NotifyCommand {
    pub fn validate(&self) -> Result<Notification, DispatcherError> {
        let user_id = parse_user_id(self.user_id.as_ref())?;
        let message = match &self.message {
            Some(Value::String(m)) => m.clone(),
            _ => return Err(DispatcherError::Validation("message")),
        };
        let payload = match &self.payload {
            Some(p) if !p.is_null() => p.clone(),
            _ => return Err(DispatcherError::Validation("payload")),
        };
        Ok(Notification {
            user_id,
            message,
            payload,
            extra: self.extra.clone().filter(|e| !e.is_null()),
            include_notification_key: self.include_notification_key.unwrap_or(false),
        })
    }
}

/// Positive integer, given either as a JSON number or a numeric string.
fn parse_user_id(value: Option<&Value>) -> Result<i64, DispatcherError> {
    let id = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.filter(|id| *id > 0)
        .ok_or(DispatcherError::Validation("user_id"))
}

/// Producers send flags as booleans, numbers or strings. Non-zero numbers
/// and non-empty strings other than `"false"`/`"0"` are set; `null` is absent.
pub fn flag_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(s) => Some(!matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "0"
        )),
        Value::Array(_) | Value::Object(_) => Some(true),
    }
}

pub(crate) fn loose_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(flag_from_value))
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryAction {
    CreateDevice,
    UpdateDevice,
    DeleteDevice,
    Notify,
}

/// Published once per registry mutation or notify attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub user_id: i64,
    pub action: TelemetryAction,
    pub platform: Platform,
    pub successful: bool,
}

// ── Feedback ─────────────────────────────────────────────────────────────────

/// "Token failed at time T", as reported by the push provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub failed_at: DateTime<Utc>,
}

/// Providers deliver either a single tuple or an array of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FeedbackBatch {
    Many(Vec<FeedbackEntry>),
    One(FeedbackEntry),
}

impl FeedbackBatch {
    pub fn into_entries(self) -> Vec<FeedbackEntry> {
        match self {
            Self::Many(entries) => entries,
            Self::One(entry) => vec![entry],
        }
    }
}

impl From<FeedbackEntry> for FeedbackBatch {
    fn from(entry: FeedbackEntry) -> Self {
        Self::One(entry)
    }
}

impl From<Vec<FeedbackEntry>> for FeedbackBatch {
    fn from(entries: Vec<FeedbackEntry>) -> Self {
        Self::Many(entries)
    }
}

// ── Pushes ───────────────────────────────────────────────────────────────────

/// An iOS alert push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsNotification {
    pub badge: u32,
    pub alert: String,
    pub payload: Value,
}

impl ApnsNotification {
    pub fn alert(message: impl Into<String>, payload: Value) -> Self {
        Self {
            badge: 1,
            alert: message.into(),
            payload,
        }
    }
}

/// Where an Android push is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PushTarget {
    /// A single registration id.
    Token(String),
    /// A user's device group.
    NotificationKey(String),
}

impl PushTarget {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Token(t) | Self::NotificationKey(t) => t,
        }
    }
}

/// A data message for the Android provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AndroidPush {
    pub target: PushTarget,
    pub data: Value,
}
