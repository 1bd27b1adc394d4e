//! Web front end: a static page, a JSON API and a websocket stream

mod routes;
mod stream;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde_json::json;
use tokio::net::TcpListener;

use crate::runtime::Simulation;

pub async fn serve(simulation: Simulation, addr: SocketAddr) -> Result<()> {
    let app = router(simulation);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Serving on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(simulation: Simulation) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/state", get(routes::get_state))
        .route("/api/config", get(routes::get_config))
        .route("/api/reset", post(routes::reset))
        .route("/api/patients", post(routes::create_patient))
        .route(
            "/api/houses/{house_id}/patients",
            post(routes::create_patient_at_house),
        )
        .route("/api/stream", get(stream::stream))
        .with_state(simulation)
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    message: String,
}

impl HttpApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
