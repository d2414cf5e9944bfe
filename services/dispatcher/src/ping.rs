use std::time::Duration;

use crate::domain::repository::{CommandQueue, DeviceRepository};
use crate::domain::types::PING_COUNTER_KEY;
use crate::error::DispatcherError;

pub const DEFAULT_PING_FREQUENCY: Duration = Duration::from_millis(60_000);

/// Why a liveness check did not pass.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("{0} is not a number")]
    NotANumber(&'static str),
    #[error("{0} is less than 1 ({1})")]
    LessThanOne(&'static str, i64),
    #[error("{0} unavailable: {1}")]
    Unavailable(&'static str, DispatcherError),
}

/// Values read by a passing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub max_device_id: i64,
    pub ping_count: i64,
}

/// External check-in URLs.
#[derive(Debug, Clone)]
pub struct PingTargets {
    pub run_url: String,
    pub complete_url: String,
    pub frequency: Duration,
}

/// Periodic best-effort liveness probe.
///
/// Signals `run`, reads the highest device id and bumps the ping counter, and
/// signals `complete` only when both values are present and at least 1.
pub struct LivenessProbe<D, Q>
where
    D: DeviceRepository,
    Q: CommandQueue,
{
    pub devices: D,
    pub queue: Q,
    pub http: reqwest::Client,
    pub targets: PingTargets,
}

impl<D, Q> LivenessProbe<D, Q>
where
    D: DeviceRepository,
    Q: CommandQueue,
{
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.targets.frequency);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&self) {
        self.signal(&self.targets.run_url).await;
        match self.check().await {
            Ok(liveness) => {
                tracing::debug!(
                    max_device_id = liveness.max_device_id,
                    ping_count = liveness.ping_count,
                    "liveness check passed"
                );
                self.signal(&self.targets.complete_url).await;
            }
            Err(failure) => tracing::error!(error = %failure, "liveness check failed"),
        }
    }

    pub async fn check(&self) -> Result<Liveness, ProbeFailure> {
        let max_id = self
            .devices
            .max_id()
            .await
            .map_err(|e| ProbeFailure::Unavailable("max device id", e))?;
        let count = self
            .queue
            .incr(PING_COUNTER_KEY)
            .await
            .map_err(|e| ProbeFailure::Unavailable("ping counter", e))?;

        Ok(Liveness {
            max_device_id: at_least_one("max device id", max_id)?,
            ping_count: at_least_one("ping counter", Some(count))?,
        })
    }

    async fn signal(&self, url: &str) {
        let result = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            tracing::warn!(url, error = %e, "ping signal failed");
        }
    }
}

fn at_least_one(what: &'static str, value: Option<i64>) -> Result<i64, ProbeFailure> {
    match value {
        None => Err(ProbeFailure::NotANumber(what)),
        Some(v) if v < 1 => Err(ProbeFailure::LessThanOne(what, v)),
        Some(v) => Ok(v),
    }
}
