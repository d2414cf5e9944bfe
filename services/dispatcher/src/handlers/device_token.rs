use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::repository::CommandQueue;
use crate::domain::types::{CommandKind, DeviceCommand, loose_flag};
use crate::error::DispatcherError;
use crate::state::ApiState;
use crate::usecase::enqueue::EnqueueDeviceUseCase;

#[derive(Deserialize)]
pub struct DeviceTokenRequest {
    pub user_id: Option<Value>,
    pub platform: Option<Value>,
    #[serde(default, deserialize_with = "loose_flag")]
    pub send_notification_key: Option<bool>,
}

impl DeviceTokenRequest {
    fn into_command(self, token: String) -> DeviceCommand {
        DeviceCommand {
            user_id: self.user_id,
            token: Some(Value::String(token)),
            platform: self.platform,
            send_notification_key: self.send_notification_key,
        }
    }
}

// ── PUT /api/device_tokens/{token} ───────────────────────────────────────────

pub async fn put_device_token<Q: CommandQueue>(
    State(state): State<ApiState<Q>>,
    Path(token): Path<String>,
    Json(body): Json<DeviceTokenRequest>,
) -> Result<StatusCode, DispatcherError> {
    let usecase = EnqueueDeviceUseCase {
        queue: state.queue.clone(),
    };
    usecase
        .execute(CommandKind::Subscribe, &body.into_command(token))
        .await?;
    Ok(StatusCode::ACCEPTED)
}

// ── DELETE /api/device_tokens/{token} ────────────────────────────────────────

pub async fn delete_device_token<Q: CommandQueue>(
    State(state): State<ApiState<Q>>,
    Path(token): Path<String>,
    Json(body): Json<DeviceTokenRequest>,
) -> Result<StatusCode, DispatcherError> {
    let mut command = body.into_command(token);
    command.send_notification_key = None;

    let usecase = EnqueueDeviceUseCase {
        queue: state.queue.clone(),
    };
    usecase.execute(CommandKind::Unsubscribe, &command).await?;
    Ok(StatusCode::ACCEPTED)
}
