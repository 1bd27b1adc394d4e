//! Serializable views of the world for the UI and the stream

use serde::Serialize;

use super::ambulance::AmbulanceState;
use super::config::SimConfig;
use super::event_log::EventLog;
use super::patient::Patient;
use super::types::{AmbulanceId, HospitalId, HouseId, PatientId, Position, Target};
use super::world::{SimStats, SimWorld};

#[derive(Debug, Clone, Serialize)]
pub struct HouseView {
    pub id: HouseId,
    pub position: Position,
    pub has_patient: bool,
    pub patients: Vec<PatientId>,
    pub ambulance_en_route: bool,
}

/// A patient in one of a hospital's queues
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryView {
    pub id: PatientId,
    pub name: String,
    pub condition: String,
    pub severity: String,
    pub wait_time: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RampView {
    pub ambulance: AmbulanceId,
    pub patient: PatientId,
    pub since: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HospitalView {
    pub id: HospitalId,
    pub position: Position,
    pub waiting: Vec<QueueEntryView>,
    pub treating: Vec<QueueEntryView>,
    pub discharged: Vec<QueueEntryView>,
    pub max_treating: usize,
    pub waiting_capacity: usize,
    pub ramp_queue_len: usize,
    /// Ambulances ramping outside, longest-waiting first
    pub ramp: Vec<RampView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmbulanceRampView {
    pub hospital: HospitalId,
    pub since: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmbulanceView {
    pub id: AmbulanceId,
    pub position: Position,
    pub state: &'static str,
    pub available: bool,
    pub target: Option<Target>,
    pub patient: Option<PatientId>,
    pub patient_name: Option<String>,
    pub condition: Option<String>,
    pub ramp: Option<AmbulanceRampView>,
}

/// The full world state as sent to clients
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub epoch: u64,
    pub time: f32,
    pub config: SimConfig,
    pub houses: Vec<HouseView>,
    pub hospitals: Vec<HospitalView>,
    pub ambulances: Vec<AmbulanceView>,
    pub patients: Vec<Patient>,
    pub events: EventLog,
    pub stats: SimStats,
}

/// Positions only, for the high-frequency broadcast
#[derive(Debug, Clone, Serialize)]
pub struct PositionsSnapshot {
    pub epoch: u64,
    pub time: f32,
    pub ambulances: Vec<AmbulanceView>,
}

impl SimWorld {
    fn ambulance_views(&self) -> Vec<AmbulanceView> {
        self.ambulances
            .values()
            .map(|a| {
                let carried = a.carried_patient().and_then(|id| self.patients.get(id));
                let ramp = match &a.state {
                    AmbulanceState::Ramping {
                        hospital, since, ..
                    } => Some(AmbulanceRampView {
                        hospital: *hospital,
                        since: *since,
                    }),
                    _ => None,
                };
                AmbulanceView {
                    id: a.id,
                    position: a.position,
                    state: a.state.label(),
                    available: a.is_idle(),
                    target: a.target(),
                    patient: a.carried_patient().cloned(),
                    patient_name: carried.map(|p| p.name.clone()),
                    condition: carried.map(|p| p.condition.display().to_string()),
                    ramp,
                }
            })
            .collect()
    }

    /// Queue entries for `ids`; ids missing from the registry are skipped
    fn queue_entries<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a PatientId>,
    ) -> Vec<QueueEntryView> {
        ids.into_iter()
            .filter_map(|id| self.patients.get(id))
            .map(|p| QueueEntryView {
                id: p.id.clone(),
                name: p.name.clone(),
                condition: p.condition.display().to_string(),
                severity: p.condition.severity_display().to_string(),
                wait_time: p.wait_time,
            })
            .collect()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let houses = self
            .houses
            .values()
            .map(|h| HouseView {
                id: h.id,
                position: h.position,
                has_patient: h.has_patient(),
                patients: h.patient_ids.iter().cloned().collect(),
                ambulance_en_route: h.ambulance_en_route,
            })
            .collect();

        let hospitals = self
            .hospitals
            .values()
            .map(|h| {
                let mut ramp: Vec<RampView> = self
                    .ambulances
                    .values()
                    .filter_map(|a| {
                        let since = a.ramping_at(h.id)?;
                        Some(RampView {
                            ambulance: a.id,
                            patient: a.carried_patient()?.clone(),
                            since,
                        })
                    })
                    .collect();
                ramp.sort_by(|a, b| a.since.total_cmp(&b.since).then(a.ambulance.cmp(&b.ambulance)));

                HospitalView {
                    id: h.id,
                    position: h.position,
                    waiting: self.queue_entries(&h.waiting),
                    treating: self.queue_entries(&h.treating),
                    discharged: self.queue_entries(&h.discharged),
                    max_treating: h.max_treating,
                    waiting_capacity: h.waiting_capacity,
                    ramp_queue_len: ramp.len(),
                    ramp,
                }
            })
            .collect();

        WorldSnapshot {
            epoch: self.epoch(),
            time: self.time,
            config: self.config.clone(),
            houses,
            hospitals,
            ambulances: self.ambulance_views(),
            patients: self.patients.values().cloned().collect(),
            events: self.events.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn positions(&self) -> PositionsSnapshot {
        PositionsSnapshot {
            epoch: self.epoch(),
            time: self.time,
            ambulances: self.ambulance_views(),
        }
    }
}
