//! Building types for the dispatch simulation
//!
//! Houses hold patients waiting for pickup; hospitals hold the three
//! treatment queues.

use std::collections::VecDeque;

use super::types::{HospitalId, HouseId, PatientId, Position};

/// A house in the simulation
#[derive(Debug, Clone)]
pub struct SimHouse {
    pub id: HouseId,
    pub position: Position,
    /// Patients waiting for pickup, first in line first
    pub patient_ids: VecDeque<PatientId>,
    /// Set while an ambulance is dispatched here
    pub ambulance_en_route: bool,
}

impl SimHouse {
    pub fn new(id: HouseId, position: Position) -> Self {
        Self {
            id,
            position,
            patient_ids: VecDeque::new(),
            ambulance_en_route: false,
        }
    }

    pub fn add_patient(&mut self, patient_id: PatientId) {
        self.patient_ids.push_back(patient_id);
    }

    /// Remove a specific patient, returning whether it was here
    pub fn remove_patient(&mut self, patient_id: &PatientId) -> bool {
        match self.patient_ids.iter().position(|p| p == patient_id) {
            Some(index) => {
                self.patient_ids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has_patient(&self) -> bool {
        !self.patient_ids.is_empty()
    }

    /// The house wants an ambulance it doesn't have yet
    pub fn needs_ambulance(&self) -> bool {
        self.has_patient() && !self.ambulance_en_route
    }
}

/// A hospital in the simulation
#[derive(Debug, Clone)]
pub struct SimHospital {
    pub id: HospitalId,
    pub position: Position,
    pub waiting: VecDeque<PatientId>,
    pub treating: Vec<PatientId>,
    pub discharged: Vec<PatientId>,
    /// Patients this hospital treats at once
    pub max_treating: usize,
    /// Waiting room size before ambulances ramp
    pub waiting_capacity: usize,
}

impl SimHospital {
    pub fn new(
        id: HospitalId,
        position: Position,
        max_treating: usize,
        waiting_capacity: usize,
    ) -> Self {
        Self {
            id,
            position,
            waiting: VecDeque::new(),
            treating: Vec::new(),
            discharged: Vec::new(),
            max_treating,
            waiting_capacity,
        }
    }

    pub fn has_waiting_room(&self) -> bool {
        self.waiting.len() < self.waiting_capacity
    }

    pub fn has_treatment_slot(&self) -> bool {
        self.treating.len() < self.max_treating
    }

    /// Admit a patient to the waiting room if there is space
    pub fn try_admit(&mut self, patient_id: PatientId) -> Result<(), PatientId> {
        if self.has_waiting_room() {
            self.waiting.push_back(patient_id);
            Ok(())
        } else {
            Err(patient_id)
        }
    }

    /// Whether the patient is in any of this hospital's queues
    pub fn holds(&self, patient_id: &PatientId) -> bool {
        self.waiting.contains(patient_id)
            || self.treating.contains(patient_id)
            || self.discharged.contains(patient_id)
    }
}
