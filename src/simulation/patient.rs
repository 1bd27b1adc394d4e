//! Patient records and their FHIR-shaped flavor data

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::PatientId;

pub const CLINICAL_STATUS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
pub const VERIFICATION_STATUS_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/condition-ver-status";
pub const CONDITION_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/condition-category";
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";

/// A single FHIR coding
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub display: String,
}

impl Coding {
    pub fn new(system: &str, code: &str, display: &str) -> Self {
        Self {
            system: system.to_string(),
            code: code.to_string(),
            display: display.to_string(),
        }
    }

    /// First coding of a CodeableConcept, if it has one
    fn first_of(concept: Option<&Value>) -> Coding {
        concept
            .and_then(|c| c.get("coding"))
            .and_then(|c| c.get(0))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default()
    }

    fn concept(&self) -> Value {
        json!({ "coding": [self] })
    }
}

/// Why the patient called the ambulance. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub clinical_status: Coding,
    pub verification_status: Coding,
    pub severity: Coding,
    pub category: Coding,
    pub code: Coding,
    pub subject_reference: String,
    pub onset_datetime: String,
    pub recorded_date: String,
    pub note: Option<String>,
}

impl Condition {
    /// Build a condition from a FHIR Condition resource.
    ///
    /// Returns `None` unless the resource declares itself a Condition and
    /// carries a code; every other field is optional and defaults to empty.
    pub fn from_fhir(resource: &Value) -> Option<Condition> {
        if resource.get("resourceType").and_then(Value::as_str) != Some("Condition") {
            return None;
        }
        let code = Coding::first_of(resource.get("code"));
        if code.display.is_empty() && code.code.is_empty() {
            return None;
        }

        let text = |key: &str| {
            resource
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Condition {
            id: text("id"),
            clinical_status: Coding::first_of(resource.get("clinicalStatus")),
            verification_status: Coding::first_of(resource.get("verificationStatus")),
            severity: Coding::first_of(resource.get("severity")),
            category: Coding::first_of(resource.get("category").and_then(|c| c.get(0))),
            code,
            subject_reference: resource
                .pointer("/subject/reference")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            onset_datetime: text("onsetDateTime"),
            recorded_date: text("recordedDate"),
            note: resource
                .pointer("/note/0/text")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn to_fhir(&self) -> Value {
        let mut resource = json!({
            "resourceType": "Condition",
            "id": self.id,
            "clinicalStatus": self.clinical_status.concept(),
            "verificationStatus": self.verification_status.concept(),
            "severity": self.severity.concept(),
            "category": [self.category.concept()],
            "code": self.code.concept(),
            "subject": { "reference": self.subject_reference },
            "onsetDateTime": self.onset_datetime,
            "recordedDate": self.recorded_date,
        });
        if let Some(note) = &self.note {
            resource["note"] = json!([{ "text": note }]);
        }
        resource
    }

    pub fn display(&self) -> &str {
        if self.code.display.is_empty() {
            "Unknown"
        } else {
            &self.code.display
        }
    }

    pub fn severity_display(&self) -> &str {
        if self.severity.display.is_empty() {
            "Unknown"
        } else {
            &self.severity.display
        }
    }

    /// One-line summary used in encounter prompts
    pub fn describe(&self) -> String {
        format!(
            "Patient presents with {}. Severity: {}. Clinical Status: {}. Notes: {}",
            self.display(),
            self.severity_display(),
            if self.clinical_status.display.is_empty() {
                "Unknown status"
            } else {
                &self.clinical_status.display
            },
            self.note.as_deref().unwrap_or("No additional notes"),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn parse(raw: &str) -> Gender {
        match raw.to_ascii_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            "other" => Gender::Other,
            _ => Gender::Unknown,
        }
    }
}

/// Who the patient is, as produced by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub id: PatientId,
    pub given_name: String,
    pub family_name: String,
    pub birth_date: String,
    pub gender: Gender,
    /// The provider's raw Patient resource, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl PatientIdentity {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.given_name, self.family_name);
        let name = name.trim();
        if name.is_empty() {
            "Unknown Patient".to_string()
        } else {
            name.to_string()
        }
    }

    pub fn to_fhir(&self) -> Value {
        if let Some(resource) = &self.resource {
            return resource.clone();
        }
        json!({
            "resourceType": "Patient",
            "id": self.id,
            "name": [{ "given": [self.given_name], "family": self.family_name }],
            "gender": self.gender,
            "birthDate": self.birth_date,
        })
    }
}

/// An opaque FHIR Encounter attached to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub id: String,
    pub resource: Value,
}

impl EncounterRecord {
    pub fn new(resource: Value) -> Self {
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { id, resource }
    }

    /// Look up a string inside the resource by JSON pointer
    pub fn text_at(&self, pointer: &str) -> Option<&str> {
        self.resource.pointer(pointer).and_then(Value::as_str)
    }

    pub fn period_start(&self) -> Option<&str> {
        self.text_at("/period/start")
    }

    pub fn is_discharge(&self) -> bool {
        self.text_at("/status") == Some("completed")
    }
}

/// A patient in the global registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub birth_date: String,
    pub gender: Gender,
    pub condition: Condition,
    /// Seconds spent in the current hospital queue
    pub wait_time: u32,
    /// Seconds spent in waiting and treating combined, never reset
    pub hospital_secs: u32,
    pub encounters: Vec<EncounterRecord>,
    #[serde(skip)]
    pub identity: PatientIdentity,
}

impl Patient {
    pub fn new(identity: PatientIdentity, condition: Condition) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.full_name(),
            birth_date: identity.birth_date.clone(),
            gender: identity.gender,
            condition,
            wait_time: 0,
            hospital_secs: 0,
            encounters: Vec::new(),
            identity,
        }
    }

    /// Tick the queue clocks by one second
    pub fn age(&mut self) {
        self.wait_time += 1;
        self.hospital_secs += 1;
    }

    /// Move the patient to a new id, keeping every reference in step
    pub fn rekey(&mut self, id: PatientId) {
        self.condition.subject_reference = format!("Patient/{id}");
        if let Some(Value::Object(resource)) = self.identity.resource.as_mut() {
            resource.insert("id".to_string(), Value::String(id.0.clone()));
        }
        self.identity.id = id.clone();
        self.id = id;
    }

    pub fn latest_encounter(&self) -> Option<&EncounterRecord> {
        self.encounters.iter().rev().find(|e| !e.is_discharge())
    }
}
