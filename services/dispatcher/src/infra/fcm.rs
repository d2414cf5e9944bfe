use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::repository::{AndroidPushPort, GroupKeyProvider};
use crate::domain::types::{AndroidPush, GroupKeyOperation, GroupKeyOperationType};
use crate::error::DispatcherError;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm";

/// Legacy FCM server credentials.
#[derive(Debug, Clone)]
pub struct FcmSettings {
    pub server_key: String,
    pub sender_id: String,
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GroupResponse {
    notification_key: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    failure: u64,
    #[serde(default)]
    results: Vec<SendResult>,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    error: Option<String>,
}

/// FCM legacy HTTP client: device-group management and data sends.
#[derive(Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    settings: FcmSettings,
}

impl FcmClient {
    pub fn new(http: reqwest::Client, settings: FcmSettings) -> Self {
        Self { http, settings }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.endpoint.trim_end_matches('/'))
    }

    async fn group_request(&self, op: &GroupKeyOperation) -> Result<String, DispatcherError> {
        let resp = self
            .http
            .post(self.url("notification"))
            .header("Authorization", format!("key={}", self.settings.server_key))
            .header("project_id", &self.settings.sender_id)
            .json(&group_operation_body(op))
            .send()
            .await
            .map_err(DispatcherError::transport)?;

        let status = resp.status();
        let body: GroupResponse = resp.json().await.map_err(|e| {
            DispatcherError::provider(anyhow::anyhow!("group response ({status}): {e}"))
        })?;
        match body {
            GroupResponse {
                notification_key: Some(key),
                ..
            } if status.is_success() => Ok(key),
            GroupResponse { error, .. } => Err(DispatcherError::provider(anyhow::anyhow!(
                "{} failed ({status}): {}",
                operation_name(op.operation_type),
                error.as_deref().unwrap_or("no notification_key returned")
            ))),
        }
    }
}

impl GroupKeyProvider for FcmClient {
    async fn perform(&self, op: &GroupKeyOperation) -> Result<String, DispatcherError> {
        match self.group_request(op).await {
            Err(DispatcherError::Provider(e))
                if op.recreate_key_if_missing && is_missing_key(&e.to_string()) =>
            {
                tracing::warn!(
                    notification_key_name = %op.notification_key_name,
                    "notification key missing at provider, recreating"
                );
                let recreate = GroupKeyOperation {
                    operation_type: GroupKeyOperationType::Create,
                    notification_key: None,
                    recreate_key_if_missing: false,
                    ..op.clone()
                };
                self.group_request(&recreate).await
            }
            other => other,
        }
    }
}

impl AndroidPushPort for FcmClient {
    async fn send(&self, push: &AndroidPush) -> Result<(), DispatcherError> {
        let resp = self
            .http
            .post(self.url("send"))
            .header("Authorization", format!("key={}", self.settings.server_key))
            .json(&send_body(push))
            .send()
            .await
            .map_err(DispatcherError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatcherError::provider(anyhow::anyhow!(
                "fcm send rejected ({status})"
            )));
        }
        let body: SendResponse = resp.json().await.map_err(DispatcherError::provider)?;
        if body.failure > 0 {
            let reason = body
                .results
                .iter()
                .find_map(|r| r.error.as_deref())
                .unwrap_or("unknown");
            return Err(DispatcherError::provider(anyhow::anyhow!(
                "fcm send failed for {} target(s): {reason}",
                body.failure
            )));
        }
        Ok(())
    }
}

fn operation_name(op: GroupKeyOperationType) -> &'static str {
    match op {
        GroupKeyOperationType::Create => "create",
        GroupKeyOperationType::Add => "add",
        GroupKeyOperationType::Remove => "remove",
    }
}

fn is_missing_key(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("notification_key not found") || message.contains("notification key not found")
}

pub fn group_operation_body(op: &GroupKeyOperation) -> Value {
    let mut body = json!({
        "operation": operation_name(op.operation_type),
        "notification_key_name": op.notification_key_name,
        "registration_ids": op.registration_ids,
    });
    if let Some(key) = &op.notification_key {
        body["notification_key"] = Value::String(key.clone());
    }
    body
}

pub fn send_body(push: &AndroidPush) -> Value {
    json!({
        "to": push.target.as_str(),
        "data": push.data,
    })
}
