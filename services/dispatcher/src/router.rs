use axum::{
    Router,
    routing::{get, put},
};

use yodel_core::health::{healthz, readyz};
use yodel_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::domain::repository::CommandQueue;
use crate::handlers::device_token::{delete_device_token, put_device_token};
use crate::state::ApiState;

pub fn build_router<Q: CommandQueue>(state: ApiState<Q>) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Device tokens
        .route(
            "/api/device_tokens/{token}",
            put(put_device_token::<Q>).delete(delete_device_token::<Q>),
        )
        .layer(propagate_request_id_layer())
        .layer(trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}
