//! Ollama generator: conditions and encounters from a local LLM.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::fallback::fhir_now;
use super::{ConditionGenerator, EncounterGenerator, GenerationError};
use crate::simulation::{Condition, EncounterRecord, EncounterRequest, PatientId};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

pub struct OllamaGenerator {
    pub base_url: String,
    pub model: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn condition_prompt(&self, patient_id: &PatientId) -> String {
        let now = fhir_now();
        format!(
            r#"Generate a valid FHIR R4 Condition resource that exactly follows this structure:
{{
    "resourceType": "Condition",
    "id": "{id}",
    "clinicalStatus": {{"coding": [{{"system": "http://terminology.hl7.org/CodeSystem/condition-clinical", "code": "active", "display": "Active"}}]}},
    "verificationStatus": {{"coding": [{{"system": "http://terminology.hl7.org/CodeSystem/condition-ver-status", "code": "confirmed", "display": "Confirmed"}}]}},
    "severity": {{"coding": [{{"system": "http://snomed.info/sct", "code": "<SNOMED CT severity code>", "display": "<Mild, Moderate or Severe>"}}]}},
    "category": [{{"coding": [{{"system": "http://terminology.hl7.org/CodeSystem/condition-category", "code": "encounter-diagnosis", "display": "Encounter Diagnosis"}}]}}],
    "code": {{"coding": [{{"system": "http://snomed.info/sct", "code": "<SNOMED CT code>", "display": "<matching SNOMED display name>"}}], "text": "<human readable condition description>"}},
    "subject": {{"reference": "Patient/{patient_id}"}},
    "onsetDateTime": "{now}",
    "recordedDate": "{now}",
    "note": [{{"text": "<clinical notes about the emergency presentation>"}}]
}}

Requirements:
- Use a real SNOMED CT code and matching display name for an emergency condition
- Use SNOMED CT severity codes (24484000 |Severe|, 6736007 |Moderate|, 255604002 |Mild|)
- Return valid FHIR JSON only, no markdown or explanation"#,
            id = Uuid::new_v4(),
        )
    }

    pub fn encounter_prompt(&self, request: &EncounterRequest, encounter_id: &str) -> String {
        let now = fhir_now();
        let practitioner = Uuid::new_v4().simple().to_string();
        let practitioner = &practitioner[..8];
        format!(
            r#"Generate a valid FHIR R4 Encounter resource that exactly follows this structure:
{{
    "resourceType": "Encounter",
    "id": "{encounter_id}",
    "status": "in-progress",
    "class": {{"system": "http://terminology.hl7.org/CodeSystem/v3-ActCode", "code": "EMER", "display": "Emergency"}},
    "type": [{{"coding": [{{"system": "http://snomed.info/sct", "code": "<SNOMED CT code for emergency encounter>", "display": "<matching display name>"}}], "text": "<encounter type description>"}}],
    "subject": {{"reference": "Patient/{patient_id}"}},
    "participant": [{{"individual": {{"reference": "Practitioner/pract-{practitioner}", "display": "<practitioner name>"}}}}],
    "period": {{"start": "{now}"}},
    "serviceProvider": {{"reference": "Organization/org-{hospital_id}", "display": "<organization name>"}},
    "reasonCode": [{{"coding": [{{"system": "http://snomed.info/sct", "code": "<SNOMED CT code for reason>", "display": "<matching display name>"}}], "text": "<reason for visit>"}}],
    "diagnosis": [{{"condition": {{"display": "{condition}"}}, "rank": 1}}],
    "procedure": [{{"display": "<procedure name>", "performedDateTime": "{now}"}}]
}}

Clinical context: {description}

Requirements:
- Use real SNOMED CT codes and display names appropriate for an emergency department
- Return valid FHIR JSON only, no markdown or explanation"#,
            patient_id = request.patient_id,
            hospital_id = request.hospital_id,
            condition = request.condition_display,
            description = request.condition_description,
        )
    }

    pub fn parse_completion_response(&self, json: &Value) -> Result<String, GenerationError> {
        json.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| GenerationError::Parse("Missing 'response' field".to_string()))
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("ollama: {}", e)))?;

        let json: Value = resp.error_for_status()?.json().await?;
        self.parse_completion_response(&json)
    }
}

/// Parse the JSON object spanning the first `{` to the last `}` of `text`
pub fn extract_json(text: &str) -> Result<Value, GenerationError> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&text[start..=end])
            .map_err(|e| GenerationError::Parse(e.to_string())),
        _ => Err(GenerationError::Parse("No JSON object in response".to_string())),
    }
}

fn expect_resource_type(resource: &Value, expected: &str) -> Result<(), GenerationError> {
    match resource.get("resourceType").and_then(Value::as_str) {
        Some(found) if found == expected => Ok(()),
        found => Err(GenerationError::InvalidResource(format!(
            "expected {expected}, got {}",
            found.unwrap_or("nothing")
        ))),
    }
}

pub fn parse_condition(text: &str) -> Result<Condition, GenerationError> {
    let resource = extract_json(text)?;
    expect_resource_type(&resource, "Condition")?;
    Condition::from_fhir(&resource)
        .ok_or_else(|| GenerationError::InvalidResource("Condition has no code".to_string()))
}

pub fn parse_encounter(text: &str, fallback_id: &str) -> Result<EncounterRecord, GenerationError> {
    let mut resource = extract_json(text)?;
    expect_resource_type(&resource, "Encounter")?;
    if resource.get("id").and_then(Value::as_str).unwrap_or_default().is_empty() {
        resource["id"] = Value::String(fallback_id.to_string());
    }
    Ok(EncounterRecord::new(resource))
}

#[async_trait]
impl ConditionGenerator for OllamaGenerator {
    async fn condition(&self, patient_id: &PatientId) -> Result<Condition, GenerationError> {
        let text = self.complete(&self.condition_prompt(patient_id)).await?;
        parse_condition(&text)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl EncounterGenerator for OllamaGenerator {
    async fn encounter(
        &self,
        request: &EncounterRequest,
    ) -> Result<EncounterRecord, GenerationError> {
        let encounter_id = Uuid::new_v4().to_string();
        let text = self
            .complete(&self.encounter_prompt(request, &encounter_id))
            .await?;
        parse_encounter(&text, &encounter_id)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::HospitalId;

    #[test]
    fn test_ollama_generator_new() {
        let g = OllamaGenerator::new("http://localhost:11434/", "llama3.1:8b");
        assert_eq!(g.base_url, "http://localhost:11434");
        assert_eq!(ConditionGenerator::name(&g), "ollama");
    }

    #[test]
    fn test_condition_prompt_mentions_patient() {
        let g = OllamaGenerator::new(DEFAULT_OLLAMA_URL, DEFAULT_MODEL);
        let prompt = g.condition_prompt(&PatientId::new("pat-1234"));
        assert!(prompt.contains("Patient/pat-1234"));
    }

    #[test]
    fn test_encounter_prompt_mentions_hospital() {
        let g = OllamaGenerator::new(DEFAULT_OLLAMA_URL, DEFAULT_MODEL);
        let request = EncounterRequest {
            patient_id: PatientId::new("pat-1"),
            patient_name: "Mary Smith".to_string(),
            hospital_id: HospitalId(2),
            condition_display: "Asthma".to_string(),
            condition_description: "Patient presents with Asthma.".to_string(),
        };
        let prompt = g.encounter_prompt(&request, "enc-1");
        assert!(prompt.contains("Organization/org-2"));
        assert!(prompt.contains("\"id\": \"enc-1\""));
    }

    #[test]
    fn test_parse_response() {
        let g = OllamaGenerator::new(DEFAULT_OLLAMA_URL, DEFAULT_MODEL);
        let raw = serde_json::json!({"response": "  {\"a\": 1}  "});
        assert_eq!(g.parse_completion_response(&raw).unwrap(), "{\"a\": 1}");
        assert!(g.parse_completion_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_extract_json_ignores_surrounding_text() {
        let text = "Sure! Here it is:\n```json\n{\"resourceType\": \"Condition\", \"x\": {\"y\": 1}}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["x"]["y"], 1);
    }

    #[test]
    fn test_extract_json_without_object() {
        assert!(matches!(extract_json("no json here"), Err(GenerationError::Parse(_))));
        assert!(matches!(extract_json("} backwards {"), Err(GenerationError::Parse(_))));
    }

    #[test]
    fn test_parse_condition() {
        let text = r#"{"resourceType": "Condition", "id": "c1",
            "code": {"coding": [{"system": "http://snomed.info/sct", "code": "29857009", "display": "Chest pain"}]},
            "severity": {"coding": [{"code": "24484000", "display": "Severe"}]},
            "note": [{"text": "Sudden onset"}]}"#;
        let condition = parse_condition(text).unwrap();
        assert_eq!(condition.display(), "Chest pain");
        assert_eq!(condition.severity_display(), "Severe");
        assert_eq!(condition.note.as_deref(), Some("Sudden onset"));
    }

    #[test]
    fn test_parse_condition_rejects_other_resources() {
        let text = r#"{"resourceType": "Observation", "code": {"coding": [{"code": "1"}]}}"#;
        assert!(matches!(parse_condition(text), Err(GenerationError::InvalidResource(_))));
    }

    #[test]
    fn test_parse_encounter_fills_missing_id() {
        let record = parse_encounter(r#"{"resourceType": "Encounter", "status": "in-progress"}"#, "enc-9").unwrap();
        assert_eq!(record.id, "enc-9");
        assert!(!record.is_discharge());
    }
}
