use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Body of `GET /readyz`.
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /healthz`: the process is up.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz`: the process is up and reports its build version.
pub async fn readyz() -> Json<Readiness> {
    Json(Readiness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
