//! Synthea identity provider.
//!
//! Talks to a service exposing `POST /generate_patient_bundle`, which answers
//! with `{ "patient": <FHIR Patient>, ... }`. Calls are serialized; the
//! service generates one bundle at a time.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{GenerationError, IdentityProvider};
use crate::simulation::{Gender, PatientId, PatientIdentity};

pub const DEFAULT_SYNTHEA_URL: &str = "http://localhost:5001";

pub struct SyntheaIdentityProvider {
    pub base_url: String,
    client: reqwest::Client,
    in_flight: Mutex<()>,
}

impl SyntheaIdentityProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            in_flight: Mutex::new(()),
        }
    }
}

fn first_str<'a>(value: Option<&'a Value>) -> &'a str {
    value
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Pull the patient's identity out of a generated bundle
pub fn parse_identity(bundle: &Value) -> Result<PatientIdentity, GenerationError> {
    let patient = bundle
        .get("patient")
        .ok_or_else(|| GenerationError::Parse("Missing 'patient' field".to_string()))?;
    if patient.get("resourceType").and_then(Value::as_str) != Some("Patient") {
        return Err(GenerationError::InvalidResource(
            "bundle 'patient' is not a Patient".to_string(),
        ));
    }

    let id = patient
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GenerationError::InvalidResource("Patient has no id".to_string()))?;

    let name = patient.pointer("/name/0");
    Ok(PatientIdentity {
        id: PatientId::new(id),
        given_name: first_str(name.and_then(|n| n.get("given"))).to_string(),
        family_name: name
            .and_then(|n| n.get("family"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        birth_date: patient
            .get("birthDate")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        gender: Gender::parse(
            patient
                .get("gender")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        ),
        resource: Some(patient.clone()),
    })
}

#[async_trait]
impl IdentityProvider for SyntheaIdentityProvider {
    async fn identity(&self) -> Result<PatientIdentity, GenerationError> {
        let _guard = self.in_flight.lock().await;

        let resp = self
            .client
            .post(format!("{}/generate_patient_bundle", self.base_url))
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("synthea: {}", e)))?;

        let bundle: Value = resp.error_for_status()?.json().await?;
        parse_identity(&bundle)
    }

    fn name(&self) -> &str {
        "synthea"
    }
}
