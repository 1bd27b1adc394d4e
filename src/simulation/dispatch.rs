//! Matching idle ambulances to houses with waiting patients

use log::debug;
use ordered_float::OrderedFloat;

use super::ambulance::AmbulanceState;
use super::event_log::EventCategory;
use super::types::{AmbulanceId, HouseId, Position};
use super::world::SimWorld;

impl SimWorld {
    /// One dispatch pass over every house that needs an ambulance.
    ///
    /// Houses are visited in id order and each takes the nearest idle
    /// ambulance. Returns the number of assignments made.
    pub fn assign_ambulances(&mut self) -> usize {
        if self.hospitals.is_empty() {
            return 0;
        }

        let waiting: Vec<HouseId> = self
            .houses
            .values()
            .filter(|h| h.needs_ambulance())
            .map(|h| h.id)
            .collect();

        waiting
            .into_iter()
            .filter(|&house_id| self.try_assign_house(house_id))
            .count()
    }

    /// Send the nearest idle ambulance to `house_id` for the patient at the
    /// head of its list.
    ///
    /// Nothing happens when there is nowhere to take the patient afterwards.
    pub fn try_assign_house(&mut self, house_id: HouseId) -> bool {
        if self.hospitals.is_empty() {
            return false;
        }

        let Some(house) = self.houses.get(&house_id) else {
            return false;
        };
        if house.ambulance_en_route {
            return false;
        }
        let Some(patient_id) = house.patient_ids.front().cloned() else {
            return false;
        };
        let destination = house.position;

        let Some(ambulance_id) = self.nearest_idle_ambulance(&destination) else {
            debug!("No idle ambulance for House {}", house_id);
            return false;
        };

        if let Some(ambulance) = self.ambulances.get_mut(&ambulance_id) {
            ambulance.state = AmbulanceState::DispatchedToHouse {
                house: house_id,
                destination,
                patient: patient_id.clone(),
            };
        }
        if let Some(house) = self.houses.get_mut(&house_id) {
            house.ambulance_en_route = true;
        }

        let name = self.patient_name(&patient_id);
        self.log_event(
            EventCategory::Ambulance,
            format!("Ambulance {ambulance_id} assigned to pick up {name} from House {house_id}"),
        );
        true
    }

    /// The closest idle ambulance by straight-line distance; ties go to the
    /// lowest id.
    pub fn nearest_idle_ambulance(&self, position: &Position) -> Option<AmbulanceId> {
        self.ambulances
            .values()
            .filter(|a| a.is_idle())
            .min_by_key(|a| (OrderedFloat(a.position.distance(position)), a.id))
            .map(|a| a.id)
    }
}
