//! Moving ambulances and handling their arrivals

use log::warn;
use ordered_float::OrderedFloat;

use super::ambulance::{AmbulanceState, AmbulanceUpdateResult};
use super::config::RampPolicy;
use super::event_log::EventCategory;
use super::types::{AmbulanceId, HospitalId, HouseId, PatientId, Position};
use super::world::SimWorld;

impl SimWorld {
    /// Advance simulation time and step every moving ambulance once
    pub fn move_ambulances(&mut self, delta_secs: f32) {
        self.time += delta_secs;

        let ambulance_ids: Vec<AmbulanceId> = self.ambulances.keys().copied().collect();
        for ambulance_id in ambulance_ids {
            let result = match self.ambulances.get_mut(&ambulance_id) {
                Some(ambulance) => ambulance.update(),
                None => continue,
            };

            match result {
                AmbulanceUpdateResult::Continue => {}
                AmbulanceUpdateResult::ArrivedAtHouse(house_id) => {
                    self.handle_house_arrival(ambulance_id, house_id);
                }
                AmbulanceUpdateResult::ArrivedAtHospital(hospital_id) => {
                    self.handle_hospital_arrival(ambulance_id, hospital_id);
                }
            }
        }
    }

    fn idle_in_place(&mut self, ambulance_id: AmbulanceId) {
        if let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) {
            let position = ambulance.position;
            ambulance.make_idle(position);
        }
    }

    /// Pick up the assigned patient and head for the nearest hospital.
    ///
    /// The house is released straight away; if more patients remain there it
    /// is offered to the next nearest idle ambulance.
    fn handle_house_arrival(&mut self, ambulance_id: AmbulanceId, house_id: HouseId) {
        let (patient_id, position) = match self.ambulances.get(&ambulance_id) {
            Some(ambulance) => match &ambulance.state {
                AmbulanceState::DispatchedToHouse { patient, .. } => {
                    (patient.clone(), ambulance.position)
                }
                _ => return,
            },
            None => return,
        };

        let picked_up = self
            .houses
            .get_mut(&house_id)
            .map(|house| {
                house.ambulance_en_route = false;
                house.remove_patient(&patient_id)
            })
            .unwrap_or(false);

        if !picked_up || !self.patients.contains_key(&patient_id) {
            warn!(
                "Ambulance {} reached House {} but patient {} is gone",
                ambulance_id, house_id, patient_id
            );
            self.idle_in_place(ambulance_id);
            self.reoffer_house(house_id);
            return;
        }

        let Some((hospital_id, destination)) = self.nearest_hospital(&position) else {
            warn!(
                "No hospital for patient {}, leaving them at House {}",
                patient_id, house_id
            );
            if let Some(house) = self.houses.get_mut(&house_id) {
                house.patient_ids.push_front(patient_id);
            }
            self.idle_in_place(ambulance_id);
            return;
        };

        if let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) {
            ambulance.state = AmbulanceState::Transporting {
                hospital: hospital_id,
                destination,
                patient: patient_id.clone(),
                redirected: false,
            };
        }
        self.stats.pickups += 1;

        let name = self.patient_name(&patient_id);
        self.log_event(
            EventCategory::Ambulance,
            format!(
                "Ambulance {ambulance_id} picked up {name} from House {house_id}, heading to Hospital {hospital_id}"
            ),
        );

        self.reoffer_house(house_id);
    }

    fn reoffer_house(&mut self, house_id: HouseId) {
        let remaining = self
            .houses
            .get(&house_id)
            .map(|h| h.has_patient())
            .unwrap_or(false);
        if remaining {
            self.try_assign_house(house_id);
        }
    }

    /// Hand the patient over, or ramp/redirect when the waiting room is full
    fn handle_hospital_arrival(&mut self, ambulance_id: AmbulanceId, hospital_id: HospitalId) {
        let (patient_id, redirected) = match self.ambulances.get(&ambulance_id).map(|a| &a.state) {
            Some(AmbulanceState::Transporting {
                patient, redirected, ..
            }) => (patient.clone(), *redirected),
            _ => return,
        };

        let Some(hospital) = self.hospitals.get_mut(&hospital_id) else {
            warn!(
                "Ambulance {} arrived at missing Hospital {}",
                ambulance_id, hospital_id
            );
            return;
        };
        let hospital_position = hospital.position;

        let patient_id = match hospital.try_admit(patient_id) {
            Ok(()) => {
                self.finish_dropoff(ambulance_id, hospital_id, hospital_position);
                return;
            }
            Err(patient_id) => patient_id,
        };

        if self.config.ramp_policy == RampPolicy::Redirect && !redirected {
            if let Some((other_id, other_position)) =
                self.redirect_candidate(hospital_id, &hospital_position)
            {
                self.redirect(ambulance_id, patient_id, hospital_id, other_id, other_position);
                return;
            }
        }

        let since = self.time;
        if let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) {
            ambulance.state = AmbulanceState::Ramping {
                hospital: hospital_id,
                destination: hospital_position,
                patient: patient_id.clone(),
                since,
                redirected,
            };
        }
        self.stats.ramp_events += 1;

        let name = self.patient_name(&patient_id);
        self.log_event(
            EventCategory::Ambulance,
            format!(
                "Ambulance {ambulance_id} ramping at Hospital {hospital_id} with {name}, waiting room full"
            ),
        );
    }

    pub(crate) fn finish_dropoff(
        &mut self,
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
        hospital_position: Position,
    ) {
        let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) else {
            return;
        };
        let Some(patient_id) = ambulance.carried_patient().cloned() else {
            return;
        };
        ambulance.make_idle(hospital_position);

        if let Some(patient) = self.patients.get_mut(&patient_id) {
            patient.wait_time = 0;
        }
        self.stats.dropoffs += 1;

        let name = self.patient_name(&patient_id);
        self.log_event(
            EventCategory::Ambulance,
            format!("Ambulance {ambulance_id} dropped off {name} at Hospital {hospital_id}"),
        );
        self.log_event(
            EventCategory::Hospital,
            format!("{name} added to waiting queue at Hospital {hospital_id}"),
        );
    }

    fn redirect(
        &mut self,
        ambulance_id: AmbulanceId,
        patient_id: PatientId,
        from: HospitalId,
        to: HospitalId,
        destination: Position,
    ) {
        if let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) {
            ambulance.state = AmbulanceState::Transporting {
                hospital: to,
                destination,
                patient: patient_id.clone(),
                redirected: true,
            };
        }
        self.stats.redirects += 1;

        let name = self.patient_name(&patient_id);
        self.log_event(
            EventCategory::Ambulance,
            format!("Ambulance {ambulance_id} redirected from Hospital {from} to Hospital {to} with {name}"),
        );
    }

    /// Another hospital with waiting room, preferring the shortest ramp queue
    /// and then the shortest distance; ties go to the lowest id.
    pub fn redirect_candidate(
        &self,
        full: HospitalId,
        from: &Position,
    ) -> Option<(HospitalId, Position)> {
        self.hospitals
            .values()
            .filter(|h| h.id != full && h.has_waiting_room())
            .min_by_key(|h| {
                (
                    self.ramp_queue_len(h.id),
                    OrderedFloat(h.position.distance(from)),
                    h.id,
                )
            })
            .map(|h| (h.id, h.position))
    }
}
