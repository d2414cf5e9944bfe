use crate::domain::repository::{AndroidPushPort, ApnsPort, GroupKeyProvider};
use crate::domain::types::{AndroidPush, ApnsNotification, GroupKeyOperation};
use crate::error::DispatcherError;
use crate::infra::apns::ApnsClient;
use crate::infra::fcm::FcmClient;
use crate::infra::queue::RedisCommandQueue;
use crate::infra::recording::RecordingProvider;

fn disabled(provider: &str) -> DispatcherError {
    DispatcherError::provider(anyhow::anyhow!("{provider} is not configured"))
}

/// iOS delivery chosen at startup.
#[derive(Clone)]
pub enum ApnsProvider {
    Live(ApnsClient),
    Recording(RecordingProvider<RedisCommandQueue>),
    Disabled,
}

impl ApnsPort for ApnsProvider {
    async fn push(
        &self,
        token: &str,
        notification: &ApnsNotification,
    ) -> Result<(), DispatcherError> {
        match self {
            Self::Live(client) => client.push(token, notification).await,
            Self::Recording(recorder) => recorder.push(token, notification).await,
            Self::Disabled => Err(disabled("apns")),
        }
    }
}

/// Android delivery and group-key management chosen at startup.
#[derive(Clone)]
pub enum FcmProvider {
    Live(FcmClient),
    Recording(RecordingProvider<RedisCommandQueue>),
    Disabled,
}

impl AndroidPushPort for FcmProvider {
    async fn send(&self, push: &AndroidPush) -> Result<(), DispatcherError> {
        match self {
            Self::Live(client) => client.send(push).await,
            Self::Recording(recorder) => recorder.send(push).await,
            Self::Disabled => Err(disabled("fcm")),
        }
    }
}

impl GroupKeyProvider for FcmProvider {
    async fn perform(&self, op: &GroupKeyOperation) -> Result<String, DispatcherError> {
        match self {
            Self::Live(client) => client.perform(op).await,
            Self::Recording(recorder) => recorder.perform(op).await,
            Self::Disabled => Err(disabled("fcm")),
        }
    }
}
