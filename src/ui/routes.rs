use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::Serialize;

use super::HttpApiError;
use crate::runtime::Simulation;
use crate::simulation::{ConfigPatch, HouseId, PatientId, SimConfig, WorldSnapshot};

const INDEX_HTML: &str = include_str!("static/index.html");

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(super) async fn get_state(State(simulation): State<Simulation>) -> Json<WorldSnapshot> {
    Json(simulation.snapshot().await)
}

pub(super) async fn get_config(State(simulation): State<Simulation>) -> Json<SimConfig> {
    Json(simulation.config().await)
}

pub(super) async fn reset(
    State(simulation): State<Simulation>,
    patch: Option<Json<ConfigPatch>>,
) -> Json<SimConfig> {
    let patch = patch.map(|Json(p)| p).unwrap_or_default();
    Json(simulation.reset(&patch).await)
}

#[derive(Debug, Serialize)]
pub(super) struct Accepted {
    status: &'static str,
}

/// Generation can take as long as the providers do, so this only queues it
pub(super) async fn create_patient(
    State(simulation): State<Simulation>,
) -> (StatusCode, Json<Accepted>) {
    simulation.spawn_random_patient();
    (StatusCode::ACCEPTED, Json(Accepted { status: "queued" }))
}

#[derive(Debug, Serialize)]
pub(super) struct CreatedPatient {
    patient_id: Option<PatientId>,
    created: bool,
}

pub(super) async fn create_patient_at_house(
    State(simulation): State<Simulation>,
    Path(house_id): Path<usize>,
) -> Result<Json<CreatedPatient>, HttpApiError> {
    let patient_id = simulation
        .create_patient_at_house(HouseId(house_id))
        .await
        .map_err(|e| HttpApiError::not_found(format!("{e:#}")))?;

    Ok(Json(CreatedPatient {
        created: patient_id.is_some(),
        patient_id,
    }))
}
