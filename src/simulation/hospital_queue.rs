//! Hospital queue manager: discharge, promotion and ramp draining
//!
//! One pass runs per second of simulated time. For each hospital in id order:
//!
//! 1. treating patients age, and those past the treating duration move to
//!    discharged
//! 2. waiting patients age, and eligible patients at the head of the line
//!    move to treating while slots are free
//! 3. ramped ambulances unload into the freed waiting room, oldest first
//!
//! Record generation for promoted and discharged patients is not done here;
//! the manager returns [`RecordRequest`]s for the caller to fulfil.

use std::collections::BTreeMap;

use log::warn;
use ordered_float::OrderedFloat;
use serde::Serialize;

use super::building::SimHospital;
use super::event_log::EventCategory;
use super::patient::Patient;
use super::types::{AmbulanceId, HospitalId, PatientId};
use super::world::SimWorld;

/// Everything the encounter generator needs to know about a promotion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterRequest {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub hospital_id: HospitalId,
    pub condition_display: String,
    pub condition_description: String,
}

/// Records owed to patients after a queue pass
#[derive(Debug, Clone, PartialEq)]
pub enum RecordRequest {
    Encounter(EncounterRequest),
    Discharge {
        patient_id: PatientId,
        hospital_id: HospitalId,
    },
}

impl SimHospital {
    /// Age treating patients and move the finished ones to discharged
    fn discharge_finished(
        &mut self,
        patients: &mut BTreeMap<PatientId, Patient>,
        treating_duration: u32,
    ) -> Vec<PatientId> {
        let mut finished = Vec::new();
        self.treating.retain(|patient_id| {
            let done = match patients.get_mut(patient_id) {
                Some(patient) => {
                    patient.age();
                    patient.wait_time >= treating_duration
                }
                None => {
                    warn!("Unknown patient {} in treatment, discharging", patient_id);
                    true
                }
            };
            if done {
                finished.push(patient_id.clone());
            }
            !done
        });
        self.discharged.extend(finished.iter().cloned());
        finished
    }

    /// Age waiting patients and promote from the head of the line.
    ///
    /// Promotion stops at the first patient who has not waited long enough,
    /// so the waiting room stays strictly first come first served.
    fn promote_eligible(
        &mut self,
        patients: &mut BTreeMap<PatientId, Patient>,
        waiting_threshold: u32,
    ) -> Vec<PatientId> {
        for patient_id in &self.waiting {
            if let Some(patient) = patients.get_mut(patient_id) {
                patient.age();
            }
        }

        let mut promoted = Vec::new();
        while self.has_treatment_slot() {
            let eligible = match self.waiting.front() {
                Some(head) => patients
                    .get(head)
                    .map(|p| p.wait_time >= waiting_threshold)
                    .unwrap_or(true),
                None => break,
            };
            if !eligible {
                break;
            }
            let Some(patient_id) = self.waiting.pop_front() else {
                break;
            };
            if let Some(patient) = patients.get_mut(&patient_id) {
                patient.wait_time = 0;
            }
            self.treating.push(patient_id.clone());
            promoted.push(patient_id);
        }
        promoted
    }
}

impl SimWorld {
    /// Run one queue pass over every hospital
    pub fn manage_hospital_queues(&mut self) -> Vec<RecordRequest> {
        let treating_duration = self.config.treating_duration;
        let waiting_threshold = self.config.waiting_time_threshold;
        let mut requests = Vec::new();

        let hospital_ids: Vec<HospitalId> = self.hospitals.keys().copied().collect();
        for hospital_id in hospital_ids {
            let Some(hospital) = self.hospitals.get_mut(&hospital_id) else {
                continue;
            };
            let discharged = hospital.discharge_finished(&mut self.patients, treating_duration);
            let promoted = hospital.promote_eligible(&mut self.patients, waiting_threshold);

            for patient_id in discharged {
                self.stats.patients_discharged += 1;
                let name = self.patient_name(&patient_id);
                self.log_event(
                    EventCategory::Hospital,
                    format!("{name} finished treatment at Hospital {hospital_id}"),
                );
                requests.push(RecordRequest::Discharge {
                    patient_id,
                    hospital_id,
                });
            }

            for patient_id in promoted {
                let Some(patient) = self.patients.get(&patient_id) else {
                    continue;
                };
                let request = EncounterRequest {
                    patient_id: patient_id.clone(),
                    patient_name: patient.name.clone(),
                    hospital_id,
                    condition_display: patient.condition.display().to_string(),
                    condition_description: patient.condition.describe(),
                };
                self.log_event(
                    EventCategory::Hospital,
                    format!(
                        "{} moved to treating at Hospital {}",
                        request.patient_name, hospital_id
                    ),
                );
                requests.push(RecordRequest::Encounter(request));
            }

            self.drain_ramp(hospital_id);
        }

        requests
    }

    /// Unload ramped ambulances while the waiting room has space.
    ///
    /// The ambulance that has ramped longest goes first; equal start times
    /// go to the lowest ambulance id.
    pub fn drain_ramp(&mut self, hospital_id: HospitalId) -> usize {
        let mut drained = 0;
        loop {
            let Some(hospital) = self.hospitals.get(&hospital_id) else {
                break;
            };
            if !hospital.has_waiting_room() {
                break;
            }
            let hospital_position = hospital.position;

            let next: Option<(OrderedFloat<f32>, AmbulanceId)> = self
                .ambulances
                .values()
                .filter_map(|a| a.ramping_at(hospital_id).map(|since| (OrderedFloat(since), a.id)))
                .min();
            let Some((since, ambulance_id)) = next else {
                break;
            };

            let Some(patient_id) = self
                .ambulances
                .get(&ambulance_id)
                .and_then(|a| a.carried_patient().cloned())
            else {
                break;
            };
            if let Some(hospital) = self.hospitals.get_mut(&hospital_id) {
                hospital.waiting.push_back(patient_id);
            }

            self.log_event(
                EventCategory::Ambulance,
                format!(
                    "Ambulance {} released from ramp at Hospital {} after {:.1}s",
                    ambulance_id,
                    hospital_id,
                    self.time - since.into_inner()
                ),
            );
            self.finish_dropoff(ambulance_id, hospital_id, hospital_position);
            drained += 1;
        }
        drained
    }
}
