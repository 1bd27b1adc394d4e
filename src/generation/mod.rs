//! Patient and record generation
//!
//! External providers (Synthea for identities, Ollama for conditions and
//! encounters) sit behind small async traits. [`PatientGenerator`] wraps each
//! call in a timeout and falls back to local synthesis, so callers always get
//! a usable result.

pub mod fallback;
pub mod ollama;
pub mod pool;
pub mod synthea;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::simulation::{Condition, EncounterRecord, EncounterRequest, Patient, PatientId, PatientIdentity};

pub use fallback::{LocalConditionGenerator, LocalIdentityProvider, TemplateEncounterGenerator};
pub use ollama::OllamaGenerator;
pub use pool::WorkerPool;
pub use synthea::SyntheaIdentityProvider;

/// Default time allowed for one provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from external generation providers.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider '{0}' unavailable")]
    Unavailable(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Http(e.to_string())
    }
}

/// Produces patient demographics.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self) -> Result<PatientIdentity, GenerationError>;
    fn name(&self) -> &str;
}

/// Produces the presenting condition for a patient.
#[async_trait]
pub trait ConditionGenerator: Send + Sync {
    async fn condition(&self, patient_id: &PatientId) -> Result<Condition, GenerationError>;
    fn name(&self) -> &str;
}

/// Produces the encounter opened when a patient starts treatment.
#[async_trait]
pub trait EncounterGenerator: Send + Sync {
    async fn encounter(&self, request: &EncounterRequest)
        -> Result<EncounterRecord, GenerationError>;
    fn name(&self) -> &str;
}

async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, GenerationError>>,
) -> Result<T, GenerationError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(limit)),
    }
}

/// Providers plus the timeout and fallback policy around them
#[derive(Clone)]
pub struct PatientGenerator {
    identities: Arc<dyn IdentityProvider>,
    conditions: Arc<dyn ConditionGenerator>,
    encounters: Arc<dyn EncounterGenerator>,
    timeout: Duration,
}

impl PatientGenerator {
    pub fn new(
        identities: Arc<dyn IdentityProvider>,
        conditions: Arc<dyn ConditionGenerator>,
        encounters: Arc<dyn EncounterGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            identities,
            conditions,
            encounters,
            timeout,
        }
    }

    /// Everything synthesized locally, no network
    pub fn local() -> Self {
        Self::new(
            Arc::new(LocalIdentityProvider),
            Arc::new(LocalConditionGenerator),
            Arc::new(TemplateEncounterGenerator),
            DEFAULT_PROVIDER_TIMEOUT,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a complete patient, falling back per step on any failure
    pub async fn generate_patient(&self) -> Patient {
        let identity = match within(self.timeout, self.identities.identity()).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(
                    "Identity provider '{}' failed, using local identity: {}",
                    self.identities.name(),
                    e
                );
                fallback::random_identity()
            }
        };

        let condition = match within(self.timeout, self.conditions.condition(&identity.id)).await {
            Ok(condition) => condition,
            Err(e) => {
                warn!(
                    "Condition generator '{}' failed for {}, using catalog condition: {}",
                    self.conditions.name(),
                    identity.id,
                    e
                );
                fallback::random_condition(&identity.id)
            }
        };

        Patient::new(identity, condition)
    }

    /// Encounter for a newly treated patient, or the local template
    pub async fn generate_encounter(&self, request: &EncounterRequest) -> EncounterRecord {
        match within(self.timeout, self.encounters.encounter(request)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Encounter generator '{}' failed for {}, using template: {}",
                    self.encounters.name(),
                    request.patient_id,
                    e
                );
                fallback::encounter(request)
            }
        }
    }
}
