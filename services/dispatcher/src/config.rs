use std::time::Duration;

use yodel_core::config::{env_flag, env_opt, env_or};

use crate::infra::fcm::{DEFAULT_FCM_ENDPOINT, FcmSettings};
use crate::ping::{DEFAULT_PING_FREQUENCY, PingTargets};

/// How pushes leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Call the real providers.
    Live,
    /// Append pushes to the `yodel:push` list instead.
    Recording,
}

impl PushMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "live" => Some(Self::Live),
            "recording" => Some(Self::Recording),
            _ => None,
        }
    }
}

/// APNs token-auth settings, before the key file is read.
#[derive(Debug, Clone)]
pub struct ApnsConfig {
    pub key_path: String,
    pub key_id: String,
    pub team_id: String,
    pub topic: String,
    pub production: bool,
}

/// Dispatcher configuration loaded from environment variables.
#[derive(Debug)]
pub struct DispatcherConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis URL for the command queues (default `redis://127.0.0.1:6379`).
    pub redis_url: String,
    /// Redis URL for telemetry. Unset means log-only telemetry.
    pub redis_events_url: Option<String>,
    /// Server-side BLPOP timeout in seconds; `0` blocks indefinitely.
    pub queue_block_timeout: f64,
    pub push_mode: PushMode,
    /// `None` disables iOS delivery.
    pub apns: Option<ApnsConfig>,
    /// Run the feedback reconciler in each worker. Env var: `APN_FEEDBACK`.
    pub apns_feedback: bool,
    /// `None` disables Android delivery and group keys.
    pub fcm: Option<FcmSettings>,
    /// `None` disables the liveness probe.
    pub ping: Option<PingTargets>,
    /// TCP port for the enqueue API (default 3000). Env var: `API_PORT`.
    pub api_port: u16,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let push_mode = match env_opt("PUSH_MODE") {
            None => PushMode::Live,
            Some(raw) => PushMode::parse(&raw).expect("PUSH_MODE must be `live` or `recording`"),
        };

        let apns = match (
            env_opt("APN_KEY_PATH"),
            env_opt("APN_KEY_ID"),
            env_opt("APN_TEAM_ID"),
            env_opt("APN_TOPIC"),
        ) {
            (Some(key_path), Some(key_id), Some(team_id), Some(topic)) => Some(ApnsConfig {
                key_path,
                key_id,
                team_id,
                topic,
                production: env_flag("APN_PRODUCTION").unwrap_or(false),
            }),
            _ => None,
        };

        let fcm = match (env_opt("GCM_SERVER_API_KEY"), env_opt("GCM_SENDER_ID")) {
            (Some(server_key), Some(sender_id)) => Some(FcmSettings {
                server_key,
                sender_id,
                endpoint: env_opt("GCM_ENDPOINT").unwrap_or_else(|| DEFAULT_FCM_ENDPOINT.to_owned()),
            }),
            _ => None,
        };

        let ping = match (env_opt("PING_RUN_URL"), env_opt("PING_COMPLETE_URL")) {
            (Some(run_url), Some(complete_url)) => Some(PingTargets {
                run_url,
                complete_url,
                frequency: env_opt("PING_FREQUENCY")
                    .and_then(|v| v.trim().parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_PING_FREQUENCY),
            }),
            _ => None,
        };

        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            redis_url: env_opt("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_owned()),
            redis_events_url: env_opt("REDIS_EVENTS_URL"),
            queue_block_timeout: env_or("QUEUE_BLOCK_TIMEOUT", 0.0),
            push_mode,
            apns,
            apns_feedback: env_flag("APN_FEEDBACK").unwrap_or(false),
            fcm,
            ping,
            api_port: env_or("API_PORT", 3000),
        }
    }
}
