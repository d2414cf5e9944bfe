use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use crate::domain::repository::{ApnsPort, FeedbackSource};
use crate::domain::types::{ApnsNotification, FeedbackBatch, FeedbackEntry};
use crate::error::DispatcherError;

const PRODUCTION_ENDPOINT: &str = "https://api.push.apple.com";
const SANDBOX_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

/// Provider tokens are valid for an hour; refresh well before that.
const TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

/// Token-based APNs credentials.
#[derive(Debug, Clone)]
pub struct ApnsSettings {
    pub key_pem: Vec<u8>,
    pub key_id: String,
    pub team_id: String,
    pub topic: String,
    pub production: bool,
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Deserialize)]
struct ErrorBody {
    reason: Option<String>,
    timestamp: Option<i64>,
}

struct CachedToken {
    jwt: String,
    issued: Instant,
}

/// APNs HTTP/2 client using ES256 provider tokens.
///
/// An `Unregistered` (410) answer is forwarded to the feedback channel, when
/// one is attached, as a stale-token report.
#[derive(Clone)]
pub struct ApnsClient {
    http: reqwest::Client,
    endpoint: String,
    topic: String,
    key_id: String,
    team_id: String,
    key: Arc<EncodingKey>,
    token: Arc<Mutex<Option<CachedToken>>>,
    feedback: Option<mpsc::UnboundedSender<FeedbackEntry>>,
}

impl ApnsClient {
    pub fn new(http: reqwest::Client, settings: ApnsSettings) -> Result<Self, DispatcherError> {
        let key = EncodingKey::from_ec_pem(&settings.key_pem)
            .map_err(|e| DispatcherError::Config(format!("invalid APNs signing key: {e}")))?;
        let endpoint = if settings.production {
            PRODUCTION_ENDPOINT
        } else {
            SANDBOX_ENDPOINT
        };
        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            topic: settings.topic,
            key_id: settings.key_id,
            team_id: settings.team_id,
            key: Arc::new(key),
            token: Arc::new(Mutex::new(None)),
            feedback: None,
        })
    }

    /// Route 410 answers into a channel and return the matching source.
    pub fn with_feedback(mut self) -> (Self, ChannelFeedbackSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feedback = Some(tx);
        (self, ChannelFeedbackSource { rx })
    }

    async fn provider_token(&self) -> Result<String, DispatcherError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.issued.elapsed() < TOKEN_LIFETIME {
                return Ok(token.jwt.clone());
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let claims = ProviderClaims {
            iss: &self.team_id,
            iat: Utc::now().timestamp(),
        };
        let jwt = jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| DispatcherError::provider(anyhow::anyhow!("sign provider token: {e}")))?;
        *cached = Some(CachedToken {
            jwt: jwt.clone(),
            issued: Instant::now(),
        });
        Ok(jwt)
    }

    fn report_unregistered(&self, token: &str, timestamp: Option<i64>) {
        let Some(feedback) = &self.feedback else {
            return;
        };
        let failed_at = timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        let entry = FeedbackEntry {
            token: token.to_owned(),
            failed_at,
        };
        if feedback.send(entry).is_err() {
            tracing::debug!("feedback receiver dropped");
        }
    }
}

impl ApnsPort for ApnsClient {
    async fn push(
        &self,
        token: &str,
        notification: &ApnsNotification,
    ) -> Result<(), DispatcherError> {
        let jwt = self.provider_token().await?;
        let resp = self
            .http
            .post(format!("{}/3/device/{token}", self.endpoint))
            .bearer_auth(jwt)
            .header("apns-topic", &self.topic)
            .header("apns-push-type", "alert")
            .json(&apns_body(notification))
            .send()
            .await
            .map_err(DispatcherError::transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body: ErrorBody = resp.json().await.unwrap_or(ErrorBody {
            reason: None,
            timestamp: None,
        });
        if status == reqwest::StatusCode::GONE {
            self.report_unregistered(token, body.timestamp);
        }
        Err(DispatcherError::provider(anyhow::anyhow!(
            "apns rejected push ({status}): {}",
            body.reason.as_deref().unwrap_or("unknown")
        )))
    }
}

/// Custom payload keys at the top level, alongside `aps`.
pub fn apns_body(notification: &ApnsNotification) -> Value {
    let aps = json!({
        "badge": notification.badge,
        "alert": notification.alert,
    });
    match &notification.payload {
        Value::Object(map) => {
            let mut body = map.clone();
            body.insert("aps".to_owned(), aps);
            Value::Object(body)
        }
        other => json!({ "aps": aps, "payload": other }),
    }
}

/// Feedback batches built from stale-token reports.
///
/// Each batch holds whatever reports have queued up since the last one.
pub struct ChannelFeedbackSource {
    rx: mpsc::UnboundedReceiver<FeedbackEntry>,
}

impl ChannelFeedbackSource {
    pub fn new(rx: mpsc::UnboundedReceiver<FeedbackEntry>) -> Self {
        Self { rx }
    }
}

impl FeedbackSource for ChannelFeedbackSource {
    async fn next_batch(&mut self) -> Option<FeedbackBatch> {
        let first = self.rx.recv().await?;
        let mut entries = vec![first];
        while let Ok(entry) = self.rx.try_recv() {
            entries.push(entry);
        }
        Some(FeedbackBatch::Many(entries))
    }
}
