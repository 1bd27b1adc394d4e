//! Ambulance state and movement logic

use serde::Serialize;

use super::types::{
    AmbulanceId, HospitalId, HouseId, PatientId, Position, Target, ARRIVAL_EPSILON,
};

/// Result of an ambulance update indicating what action should be taken
#[derive(Debug, Clone, PartialEq)]
pub enum AmbulanceUpdateResult {
    /// Idle, ramping, or still on the way
    Continue,
    ArrivedAtHouse(HouseId),
    ArrivedAtHospital(HospitalId),
}

/// The single source of truth for what an ambulance is doing.
///
/// Availability, target and carried patient are all derived from this, so
/// they can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AmbulanceState {
    Idle,
    DispatchedToHouse {
        house: HouseId,
        destination: Position,
        /// The patient at the head of the house's list on assignment
        patient: PatientId,
    },
    Transporting {
        hospital: HospitalId,
        destination: Position,
        patient: PatientId,
        /// A redirect has already been used on this trip
        redirected: bool,
    },
    Ramping {
        hospital: HospitalId,
        destination: Position,
        patient: PatientId,
        /// Simulation time at which ramping began
        since: f32,
        redirected: bool,
    },
}

impl AmbulanceState {
    pub fn label(&self) -> &'static str {
        match self {
            AmbulanceState::Idle => "idle",
            AmbulanceState::DispatchedToHouse { .. } => "dispatched_to_house",
            AmbulanceState::Transporting { .. } => "transporting_to_hospital",
            AmbulanceState::Ramping { .. } => "ramping",
        }
    }
}

/// An ambulance in the dispatch simulation
#[derive(Debug, Clone)]
pub struct SimAmbulance {
    pub id: AmbulanceId,
    pub position: Position,
    /// Hospital the ambulance was stationed at on world creation
    pub home_hospital: Option<HospitalId>,
    pub state: AmbulanceState,
    /// Per-axis distance covered each motion tick
    pub step: f32,
}

impl SimAmbulance {
    pub fn new(
        id: AmbulanceId,
        position: Position,
        home_hospital: Option<HospitalId>,
        step: f32,
    ) -> Self {
        Self {
            id,
            position,
            home_hospital,
            state: AmbulanceState::Idle,
            step,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, AmbulanceState::Idle)
    }

    pub fn target(&self) -> Option<Target> {
        match &self.state {
            AmbulanceState::Idle => None,
            AmbulanceState::DispatchedToHouse {
                house, destination, ..
            } => Some(Target::House {
                id: *house,
                position: *destination,
            }),
            AmbulanceState::Transporting {
                hospital,
                destination,
                ..
            }
            | AmbulanceState::Ramping {
                hospital,
                destination,
                ..
            } => Some(Target::Hospital {
                id: *hospital,
                position: *destination,
            }),
        }
    }

    /// The patient on board, if any
    pub fn carried_patient(&self) -> Option<&PatientId> {
        match &self.state {
            AmbulanceState::Transporting { patient, .. }
            | AmbulanceState::Ramping { patient, .. } => Some(patient),
            _ => None,
        }
    }

    /// Ramp start time if ramping at `hospital_id`
    pub fn ramping_at(&self, hospital_id: HospitalId) -> Option<f32> {
        match &self.state {
            AmbulanceState::Ramping {
                hospital, since, ..
            } if *hospital == hospital_id => Some(*since),
            _ => None,
        }
    }

    /// Advance one motion tick toward the current target.
    ///
    /// Ramping ambulances are parked and never report arrival again; the
    /// queue manager releases them.
    pub fn update(&mut self) -> AmbulanceUpdateResult {
        if matches!(
            self.state,
            AmbulanceState::Idle | AmbulanceState::Ramping { .. }
        ) {
            return AmbulanceUpdateResult::Continue;
        }

        let Some(target) = self.target() else {
            return AmbulanceUpdateResult::Continue;
        };
        let destination = target.position();

        self.position = self.position.step_towards(&destination, self.step);

        if self.position.distance(&destination) > ARRIVAL_EPSILON {
            return AmbulanceUpdateResult::Continue;
        }

        self.position = destination;
        match target {
            Target::House { id, .. } => AmbulanceUpdateResult::ArrivedAtHouse(id),
            Target::Hospital { id, .. } => AmbulanceUpdateResult::ArrivedAtHospital(id),
        }
    }

    /// Drop everything and wait at `position`
    pub fn make_idle(&mut self, position: Position) {
        self.state = AmbulanceState::Idle;
        self.position = position;
    }
}
