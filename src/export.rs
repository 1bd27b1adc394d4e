//! Writes generated FHIR resources to a per-session directory

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use serde_json::Value;

use crate::simulation::{EncounterRecord, Patient, PatientId};

pub const DEFAULT_EXPORT_ROOT: &str = "fhir_export";

/// `<root>/session_<timestamp>/<patient id>/{patient,condition,encounter_<n>}.json`
#[derive(Debug, Clone)]
pub struct FhirExporter {
    session_dir: PathBuf,
}

impl FhirExporter {
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let session_dir = root
            .as_ref()
            .join(format!("session_{}", Local::now().format("%Y%m%d_%H%M%S")));
        fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create {}", session_dir.display()))?;
        info!("Exporting FHIR resources to {}", session_dir.display());
        Ok(Self { session_dir })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    fn patient_dir(&self, patient_id: &PatientId) -> Result<PathBuf> {
        let dir = self.session_dir.join(patient_dir_name(patient_id));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    fn write(path: PathBuf, resource: &Value) -> Result<()> {
        let body = serde_json::to_string_pretty(resource)?;
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn export_patient(&self, patient: &Patient) -> Result<()> {
        let dir = self.patient_dir(&patient.id)?;
        Self::write(dir.join("patient.json"), &patient.identity.to_fhir())?;
        Self::write(dir.join("condition.json"), &patient.condition.to_fhir())
    }

    /// `sequence` is the record's 1-based position in the patient's history
    pub fn export_encounter(
        &self,
        patient_id: &PatientId,
        sequence: usize,
        record: &EncounterRecord,
    ) -> Result<()> {
        let dir = self.patient_dir(patient_id)?;
        Self::write(dir.join(format!("encounter_{sequence}.json")), &record.resource)
    }
}

/// Directory name for a patient. Provider ids are untrusted, so anything
/// outside `[A-Za-z0-9_-]` becomes `_`.
pub fn patient_dir_name(patient_id: &PatientId) -> String {
    let name: String = patient_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}
