//! Local synthesis used when the external providers are off or failing

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use super::{ConditionGenerator, EncounterGenerator, GenerationError, IdentityProvider};
use crate::simulation::{
    Coding, Condition, EncounterRecord, EncounterRequest, Gender, Patient, PatientId,
    PatientIdentity, CLINICAL_STATUS_SYSTEM, CONDITION_CATEGORY_SYSTEM, SNOMED_SYSTEM,
    VERIFICATION_STATUS_SYSTEM,
};

pub const DISCHARGE_DISPOSITION_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/discharge-disposition";
pub const ACT_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// SNOMED severity codes
pub const SEVERE: (&str, &str) = ("24484000", "Severe");
pub const MODERATE: (&str, &str) = ("6736007", "Moderate");
pub const MILD: (&str, &str) = ("255604002", "Mild");

/// Emergency presentations as (SNOMED code, display, severity)
pub const CONDITION_CATALOG: &[(&str, &str, (&str, &str))] = &[
    ("29857009", "Chest pain", SEVERE),
    ("195967001", "Asthma", MODERATE),
    ("125605004", "Fracture of bone", MODERATE),
    ("230690007", "Cerebrovascular accident", SEVERE),
    ("271594007", "Syncope", MILD),
    ("427623005", "Ambulatory patient", SEVERE),
];

const GIVEN_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
];

const FAMILY_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Wilson", "Anderson", "Taylor", "Moore",
];

const MIN_AGE_YEARS: i64 = 18;
const MAX_AGE_YEARS: i64 = 90;

/// Current UTC time in the format FHIR resources use
pub fn fhir_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn patient_id() -> PatientId {
    let hex = Uuid::new_v4().simple().to_string();
    PatientId::new(format!("pat-{}", &hex[..8]))
}

pub fn identity<R: Rng + ?Sized>(rng: &mut R) -> PatientIdentity {
    let given = GIVEN_NAMES.choose(rng).copied().unwrap_or("Alex");
    let family = FAMILY_NAMES.choose(rng).copied().unwrap_or("Doe");
    let gender = match rng.random_range(0..2) {
        0 => Gender::Male,
        _ => Gender::Female,
    };
    let age_days = rng.random_range(MIN_AGE_YEARS * 365..=MAX_AGE_YEARS * 365);
    let birth_date = (Utc::now().date_naive() - Duration::days(age_days))
        .format("%Y-%m-%d")
        .to_string();

    PatientIdentity {
        id: patient_id(),
        given_name: given.to_string(),
        family_name: family.to_string(),
        birth_date,
        gender,
        resource: None,
    }
}

pub fn condition<R: Rng + ?Sized>(patient_id: &PatientId, rng: &mut R) -> Condition {
    let &(code, display, (severity_code, severity_display)) = CONDITION_CATALOG
        .choose(rng)
        .unwrap_or(&CONDITION_CATALOG[CONDITION_CATALOG.len() - 1]);
    let now = fhir_now();

    Condition {
        id: Uuid::new_v4().to_string(),
        clinical_status: Coding::new(CLINICAL_STATUS_SYSTEM, "active", "Active"),
        verification_status: Coding::new(VERIFICATION_STATUS_SYSTEM, "confirmed", "Confirmed"),
        severity: Coding::new(SNOMED_SYSTEM, severity_code, severity_display),
        category: Coding::new(
            CONDITION_CATEGORY_SYSTEM,
            "encounter-diagnosis",
            "Encounter Diagnosis",
        ),
        code: Coding::new(SNOMED_SYSTEM, code, display),
        subject_reference: format!("Patient/{patient_id}"),
        onset_datetime: now.clone(),
        recorded_date: now,
        note: Some("Emergency presentation (fallback patient)".to_string()),
    }
}

pub fn patient<R: Rng + ?Sized>(rng: &mut R) -> Patient {
    let identity = identity(rng);
    let condition = condition(&identity.id, rng);
    Patient::new(identity, condition)
}

pub fn random_identity() -> PatientIdentity {
    identity(&mut rand::rng())
}

pub fn random_condition(patient_id: &PatientId) -> Condition {
    condition(patient_id, &mut rand::rng())
}

/// Emergency encounter opened when treatment starts
pub fn encounter(request: &EncounterRequest) -> EncounterRecord {
    let now = fhir_now();
    EncounterRecord::new(json!({
        "resourceType": "Encounter",
        "id": Uuid::new_v4().to_string(),
        "status": "in-progress",
        "class": {
            "system": ACT_CODE_SYSTEM,
            "code": "EMER",
            "display": "Emergency"
        },
        "type": [{
            "coding": [{
                "system": SNOMED_SYSTEM,
                "code": "50849002",
                "display": "Emergency room admission"
            }],
            "text": "Emergency department treatment"
        }],
        "subject": { "reference": format!("Patient/{}", request.patient_id) },
        "period": { "start": now },
        "serviceProvider": {
            "reference": format!("Organization/org-{}", request.hospital_id),
            "display": format!("Hospital {}", request.hospital_id)
        },
        "reasonCode": [{
            "coding": [{
                "system": SNOMED_SYSTEM,
                "display": request.condition_display
            }],
            "text": request.condition_description
        }]
    }))
}

/// Closing record for a treated patient, sharing the encounter's id
pub fn discharge(encounter_id: &str, start: &str, end: &str) -> EncounterRecord {
    EncounterRecord::new(json!({
        "resourceType": "Encounter",
        "id": encounter_id,
        "status": "completed",
        "hospitalization": {
            "dischargeDisposition": {
                "coding": [{
                    "system": DISCHARGE_DISPOSITION_SYSTEM,
                    "code": "home",
                    "display": "Discharged to home"
                }],
                "text": "Patient discharged to home after treatment"
            }
        },
        "period": { "start": start, "end": end }
    }))
}

pub struct LocalIdentityProvider;

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn identity(&self) -> Result<PatientIdentity, GenerationError> {
        Ok(random_identity())
    }

    fn name(&self) -> &str {
        "local"
    }
}

pub struct LocalConditionGenerator;

#[async_trait]
impl ConditionGenerator for LocalConditionGenerator {
    async fn condition(&self, patient_id: &PatientId) -> Result<Condition, GenerationError> {
        Ok(random_condition(patient_id))
    }

    fn name(&self) -> &str {
        "catalog"
    }
}

pub struct TemplateEncounterGenerator;

#[async_trait]
impl EncounterGenerator for TemplateEncounterGenerator {
    async fn encounter(
        &self,
        request: &EncounterRequest,
    ) -> Result<EncounterRecord, GenerationError> {
        Ok(encounter(request))
    }

    fn name(&self) -> &str {
        "template"
    }
}
