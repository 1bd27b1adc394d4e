//! Main simulation world that ties everything together
//!
//! `SimWorld` owns every entity. The runtime shares it behind one lock and
//! drives the dispatch, motion and queue loops separately; headless runs and
//! tests drive them together through [`SimWorld::tick`].

use anyhow::{Context, Result};
use log::{debug, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

use super::ambulance::{AmbulanceState, SimAmbulance};
use super::building::{SimHospital, SimHouse};
use super::config::SimConfig;
use super::event_log::{EventCategory, EventLog};
use super::hospital_queue::RecordRequest;
use super::patient::{EncounterRecord, Patient};
use super::types::{AmbulanceId, HospitalId, HouseId, PatientId, Position};
use crate::generation::fallback;

/// Seconds between dispatch passes
pub const DISPATCH_INTERVAL_SECS: f32 = 1.0;
/// Seconds between hospital queue passes
pub const QUEUE_INTERVAL_SECS: f32 = 1.0;

/// Running totals for summaries and the headless report
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SimStats {
    pub patients_generated: usize,
    pub pickups: usize,
    pub dropoffs: usize,
    pub ramp_events: usize,
    pub redirects: usize,
    pub patients_discharged: usize,
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,

    pub houses: BTreeMap<HouseId, SimHouse>,

    pub hospitals: BTreeMap<HospitalId, SimHospital>,

    pub ambulances: BTreeMap<AmbulanceId, SimAmbulance>,

    /// Every patient created this run, including discharged ones
    pub patients: BTreeMap<PatientId, Patient>,

    pub events: EventLog,

    pub stats: SimStats,

    /// Simulation time in seconds, advanced by the motion engine
    pub time: f32,

    /// Generate fallback patients from [`SimWorld::tick`]
    pub auto_generate: bool,

    /// Incremented on each reset so late async results can be discarded
    epoch: u64,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,

    /// Patients whose encounter is still being generated, with the hospital
    /// that discharged them in the meantime
    pending_encounters: HashMap<PatientId, Option<HospitalId>>,

    dispatch_timer: f32,
    queue_timer: f32,
    next_generation_in: f32,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimWorld {
    fn new_internal(config: SimConfig, rng: Option<StdRng>) -> Self {
        Self {
            config,
            houses: BTreeMap::new(),
            hospitals: BTreeMap::new(),
            ambulances: BTreeMap::new(),
            patients: BTreeMap::new(),
            events: EventLog::new(),
            stats: SimStats::default(),
            time: 0.0,
            auto_generate: false,
            epoch: 0,
            rng,
            pending_encounters: HashMap::new(),
            dispatch_timer: 0.0,
            queue_timer: 0.0,
            next_generation_in: 0.0,
        }
    }

    /// An empty world; entities are added with the `add_*` methods
    pub fn new(config: SimConfig) -> Self {
        Self::new_internal(config, None)
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(config: SimConfig, seed: u64) -> Self {
        Self::new_internal(config, Some(StdRng::seed_from_u64(seed)))
    }

    /// Build the standard layout described by `config`
    pub fn from_config(config: SimConfig) -> Self {
        Self::build_layout(Self::new(config))
    }

    pub fn from_config_with_seed(config: SimConfig, seed: u64) -> Self {
        Self::build_layout(Self::new_with_seed(config, seed))
    }

    /// Houses in a column on the left, hospitals on the right, ambulances
    /// spread round-robin over the hospitals
    fn build_layout(mut world: SimWorld) -> Self {
        for i in 0..world.config.house_count {
            world.add_house(Position::new(50.0, 50.0 + i as f32 * 60.0));
        }

        for i in 0..world.config.hospital_count {
            world.add_hospital(Position::new(450.0, 50.0 + i as f32 * 200.0));
        }

        let stations: Vec<(HospitalId, Position)> = world
            .hospitals
            .values()
            .map(|h| (h.id, h.position))
            .collect();
        for i in 0..world.config.ambulance_count {
            match stations.get(i % stations.len().max(1)) {
                Some(&(hospital_id, position)) => {
                    world.add_ambulance(position, Some(hospital_id));
                }
                None => {
                    world.add_ambulance(Position::default(), None);
                }
            }
        }

        world
    }

    /// Carry the epoch over from the world being replaced
    pub fn succeeding(mut self, previous: &SimWorld) -> Self {
        self.epoch = previous.epoch + 1;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::RangeInclusive<f32>) -> f32 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    fn random_index(&mut self, len: usize) -> usize {
        match &mut self.rng {
            Some(rng) => rng.random_range(0..len),
            None => rand::rng().random_range(0..len),
        }
    }

    /// Synthesize a patient locally, using seeded RNG if available
    pub fn synthesize_patient(&mut self) -> Patient {
        match &mut self.rng {
            Some(rng) => fallback::patient(rng),
            None => fallback::patient(&mut rand::rng()),
        }
    }

    pub fn add_house(&mut self, position: Position) -> HouseId {
        let id = HouseId(self.houses.len());
        self.houses.insert(id, SimHouse::new(id, position));
        id
    }

    pub fn add_hospital(&mut self, position: Position) -> HospitalId {
        let id = HospitalId(self.hospitals.len());
        let hospital = SimHospital::new(
            id,
            position,
            self.config.max_treating_per_hospital,
            self.config.hospital_waiting_capacity,
        );
        self.hospitals.insert(id, hospital);
        id
    }

    pub fn add_ambulance(
        &mut self,
        position: Position,
        home_hospital: Option<HospitalId>,
    ) -> AmbulanceId {
        let id = AmbulanceId(self.ambulances.len());
        let ambulance = SimAmbulance::new(id, position, home_hospital, self.config.ambulance_step);
        self.ambulances.insert(id, ambulance);
        id
    }

    pub fn log_event(&mut self, category: EventCategory, message: impl Into<String>) {
        self.events.push(category, message);
    }

    pub fn patient_name(&self, patient_id: &PatientId) -> String {
        self.patients
            .get(patient_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Patient {patient_id}"))
    }

    /// Register a patient and place them at `house`, or at a random house.
    ///
    /// A patient whose id is already registered is re-keyed to a fresh
    /// local id. Returns the id the patient was registered under.
    pub fn admit_patient(
        &mut self,
        mut patient: Patient,
        house: Option<HouseId>,
    ) -> Result<PatientId> {
        let house_id = match house {
            Some(id) => id,
            None => {
                let ids: Vec<HouseId> = self.houses.keys().copied().collect();
                if ids.is_empty() {
                    anyhow::bail!("No houses to place patient {} at", patient.id);
                }
                ids[self.random_index(ids.len())]
            }
        };

        if !self.houses.contains_key(&house_id) {
            anyhow::bail!("House {house_id} not found");
        }

        if self.patients.contains_key(&patient.id) {
            let fresh = loop {
                let id = fallback::patient_id();
                if !self.patients.contains_key(&id) {
                    break id;
                }
            };
            warn!("Patient id {} is already registered, admitting as {}", patient.id, fresh);
            patient.rekey(fresh);
        }

        let patient_id = patient.id.clone();
        if let Some(house) = self.houses.get_mut(&house_id) {
            house.add_patient(patient_id.clone());
        }

        let message = format!(
            "New patient at House {} | ID: {} | Name: {} | Gender: {:?} | DOB: {} | Condition: {} (Code: {}) | Severity: {}",
            house_id,
            patient.id,
            patient.name,
            patient.gender,
            patient.birth_date,
            patient.condition.display(),
            patient.condition.code.code,
            patient.condition.severity_display(),
        );
        self.patients.insert(patient_id.clone(), patient);
        self.stats.patients_generated += 1;
        self.log_event(EventCategory::Patient, message);

        Ok(patient_id)
    }

    /// Manual trigger: synthesize a patient at a specific house immediately.
    ///
    /// Returns `Ok(None)` when the house already has someone waiting.
    pub fn create_patient_at_house(&mut self, house_id: HouseId) -> Result<Option<PatientId>> {
        let house = self
            .houses
            .get(&house_id)
            .with_context(|| format!("House {house_id} not found"))?;
        if house.has_patient() {
            debug!("House {} already has a patient waiting, ignoring", house_id);
            return Ok(None);
        }

        let patient = self.synthesize_patient();
        let patient_id = self.admit_patient(patient, Some(house_id))?;
        Ok(Some(patient_id))
    }

    pub fn nearest_hospital(&self, position: &Position) -> Option<(HospitalId, Position)> {
        self.hospitals
            .values()
            .min_by_key(|h| OrderedFloat(h.position.distance(position)))
            .map(|h| (h.id, h.position))
    }

    /// Number of ambulances ramping outside a hospital
    pub fn ramp_queue_len(&self, hospital_id: HospitalId) -> usize {
        self.ambulances
            .values()
            .filter(|a| a.ramping_at(hospital_id).is_some())
            .count()
    }

    /// Mark a patient's encounter as being generated elsewhere. A discharge
    /// that comes due first waits for [`SimWorld::attach_encounter`].
    pub fn expect_encounter(&mut self, patient_id: &PatientId) {
        self.pending_encounters.insert(patient_id.clone(), None);
    }

    pub fn awaiting_encounter(&self, patient_id: &PatientId) -> bool {
        self.pending_encounters.contains_key(patient_id)
    }

    /// Attach a generated encounter to a patient, closing it straight away
    /// if the patient was discharged while it was being generated.
    ///
    /// Returns the records appended to the patient's history.
    pub fn attach_encounter(
        &mut self,
        patient_id: &PatientId,
        hospital_id: HospitalId,
        record: EncounterRecord,
    ) -> Vec<EncounterRecord> {
        let deferred_discharge = self.pending_encounters.remove(patient_id).flatten();
        let Some(patient) = self.patients.get_mut(patient_id) else {
            warn!("Encounter for unknown patient {}, dropping", patient_id);
            return Vec::new();
        };

        let message = format!(
            "New Encounter for {} at Hospital {} | Type: {} | Status: {} | Reason: {}",
            patient.name,
            hospital_id,
            record.text_at("/type/0/coding/0/display").unwrap_or("Unknown"),
            record.text_at("/status").unwrap_or("unknown"),
            record
                .text_at("/reasonCode/0/coding/0/display")
                .unwrap_or("Unknown"),
        );
        patient.encounters.push(record.clone());
        self.log_event(EventCategory::Hospital, message);

        let mut appended = vec![record];
        if let Some(discharged_from) = deferred_discharge {
            appended.extend(self.complete_discharge(patient_id, discharged_from));
        }
        appended
    }

    /// Close the patient's latest encounter with a discharge record.
    ///
    /// Returns `None` when there is nothing to close yet, including when the
    /// encounter is still being generated.
    pub fn complete_discharge(
        &mut self,
        patient_id: &PatientId,
        hospital_id: HospitalId,
    ) -> Option<EncounterRecord> {
        if let Some(slot) = self.pending_encounters.get_mut(patient_id) {
            debug!("Discharge of {} waits for its encounter", patient_id);
            *slot = Some(hospital_id);
            return None;
        }

        let patient = match self.patients.get_mut(patient_id) {
            Some(p) => p,
            None => {
                warn!("Discharge for unknown patient {}, dropping", patient_id);
                return None;
            }
        };

        let (encounter_id, start) = match patient.latest_encounter() {
            Some(e) => (
                e.id.clone(),
                e.period_start().map(str::to_string).unwrap_or_else(fallback::fhir_now),
            ),
            None => {
                let name = patient.name.clone();
                self.log_event(
                    EventCategory::Hospital,
                    format!(
                        "{name} discharged from Hospital {hospital_id} (no prior encounter found)"
                    ),
                );
                return None;
            }
        };

        let end = fallback::fhir_now();
        let record = fallback::discharge(&encounter_id, &start, &end);
        patient.encounters.push(record.clone());
        let message = format!(
            "{} discharged from Hospital {} | Encounter ID: {} | Duration: {} to {} | Disposition: {} | Time in hospital: {}s",
            patient.name,
            hospital_id,
            encounter_id,
            start,
            end,
            record
                .text_at("/hospitalization/dischargeDisposition/coding/0/display")
                .unwrap_or("Unknown"),
            patient.hospital_secs,
        );
        self.log_event(EventCategory::Hospital, message);
        Some(record)
    }

    /// Fulfil record requests synchronously with the local templates
    pub fn resolve_records_locally(&mut self, requests: Vec<RecordRequest>) {
        for request in requests {
            match request {
                RecordRequest::Encounter(request) => {
                    let record = fallback::encounter(&request);
                    self.attach_encounter(&request.patient_id, request.hospital_id, record);
                }
                RecordRequest::Discharge {
                    patient_id,
                    hospital_id,
                } => {
                    self.complete_discharge(&patient_id, hospital_id);
                }
            }
        }
    }

    fn schedule_next_generation(&mut self) {
        let min = self.config.generation_interval_min_secs as f32;
        let max = self.config.generation_interval_max_secs.max(1) as f32;
        self.next_generation_in = self.random_range(min.min(max)..=max);
    }

    /// Advance every loop by `delta_secs` of simulated time.
    ///
    /// Motion runs once per call; dispatch, the queue manager and (with
    /// `auto_generate`) patient generation run whenever their interval has
    /// accumulated. Record requests are served by the local templates.
    pub fn tick(&mut self, delta_secs: f32) {
        self.move_ambulances(delta_secs);

        self.dispatch_timer += delta_secs;
        while self.dispatch_timer >= DISPATCH_INTERVAL_SECS {
            self.dispatch_timer -= DISPATCH_INTERVAL_SECS;
            self.assign_ambulances();
        }

        self.queue_timer += delta_secs;
        while self.queue_timer >= QUEUE_INTERVAL_SECS {
            self.queue_timer -= QUEUE_INTERVAL_SECS;
            let requests = self.manage_hospital_queues();
            self.resolve_records_locally(requests);
        }

        if self.auto_generate && !self.houses.is_empty() {
            self.next_generation_in -= delta_secs;
            if self.next_generation_in <= 0.0 {
                let patient = self.synthesize_patient();
                if let Err(err) = self.admit_patient(patient, None) {
                    warn!("Failed to admit generated patient: {err:#}");
                }
                self.schedule_next_generation();
            }
        }
    }

    /// Check structural invariants, returning a description of each violation
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut locations: HashMap<&PatientId, Vec<String>> = HashMap::new();

        for house in self.houses.values() {
            for patient_id in &house.patient_ids {
                locations
                    .entry(patient_id)
                    .or_default()
                    .push(format!("house {}", house.id));
            }
            let targeted = self.ambulances.values().any(|a| {
                matches!(&a.state, AmbulanceState::DispatchedToHouse { house: h, .. } if *h == house.id)
            });
            if house.ambulance_en_route != targeted {
                violations.push(format!(
                    "house {} en-route flag is {} but targeted is {}",
                    house.id, house.ambulance_en_route, targeted
                ));
            }
        }

        for ambulance in self.ambulances.values() {
            if let Some(patient_id) = ambulance.carried_patient() {
                locations
                    .entry(patient_id)
                    .or_default()
                    .push(format!("ambulance {}", ambulance.id));
            }
        }

        for hospital in self.hospitals.values() {
            let queues = [
                ("waiting", hospital.waiting.iter().collect::<Vec<_>>()),
                ("treating", hospital.treating.iter().collect()),
                ("discharged", hospital.discharged.iter().collect()),
            ];
            for (name, queue) in queues {
                for patient_id in queue {
                    locations
                        .entry(patient_id)
                        .or_default()
                        .push(format!("hospital {} {}", hospital.id, name));
                }
            }
            if hospital.treating.len() > hospital.max_treating {
                violations.push(format!(
                    "hospital {} treating {} patients, limit {}",
                    hospital.id,
                    hospital.treating.len(),
                    hospital.max_treating
                ));
            }
        }

        for (patient_id, places) in locations {
            if places.len() > 1 {
                violations.push(format!("patient {patient_id} found in {}", places.join(", ")));
            }
        }

        violations
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Ambulance Simulation Summary ===");
        println!("Time: {:.2}s", self.time);
        println!(
            "Houses: {}, Hospitals: {}, Ambulances: {}, Patients: {}",
            self.houses.len(),
            self.hospitals.len(),
            self.ambulances.len(),
            self.patients.len()
        );
        println!();

        println!("--- Hospitals ---");
        for hospital in self.hospitals.values() {
            println!(
                "  Hospital {}: waiting={}/{}, treating={}/{}, discharged={}, ramping={}",
                hospital.id,
                hospital.waiting.len(),
                hospital.waiting_capacity,
                hospital.treating.len(),
                hospital.max_treating,
                hospital.discharged.len(),
                self.ramp_queue_len(hospital.id)
            );
        }

        let pending: usize = self.houses.values().map(|h| h.patient_ids.len()).sum();
        println!("--- Houses ---");
        println!("  Patients awaiting pickup: {}", pending);

        println!("--- Ambulances ---");
        for ambulance in self.ambulances.values() {
            println!(
                "  Ambulance {}: state={}, position=({:.1}, {:.1}), patient={}",
                ambulance.id,
                ambulance.state.label(),
                ambulance.position.x,
                ambulance.position.y,
                ambulance
                    .carried_patient()
                    .map(|p| self.patient_name(p))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    /// Draw a visual map of the world in the terminal
    pub fn draw_map(&self) {
        const COLS: usize = 48;
        const ROWS: usize = 20;

        let positions = self
            .houses
            .values()
            .map(|h| h.position)
            .chain(self.hospitals.values().map(|h| h.position))
            .chain(self.ambulances.values().map(|a| a.position));

        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for pos in positions {
            min_x = min_x.min(pos.x);
            max_x = max_x.max(pos.x);
            min_y = min_y.min(pos.y);
            max_y = max_y.max(pos.y);
        }
        if !min_x.is_finite() {
            println!("(empty world)");
            return;
        }

        let span_x = (max_x - min_x).max(1.0);
        let span_y = (max_y - min_y).max(1.0);
        let to_cell = |pos: &Position| {
            let col = ((pos.x - min_x) / span_x * (COLS - 1) as f32).round() as usize;
            let row = ((pos.y - min_y) / span_y * (ROWS - 1) as f32).round() as usize;
            (row.min(ROWS - 1), col.min(COLS - 1))
        };

        let mut grid = vec![vec![' '; COLS]; ROWS];
        for house in self.houses.values() {
            let (row, col) = to_cell(&house.position);
            grid[row][col] = if house.has_patient() { '!' } else { 'h' };
        }
        for hospital in self.hospitals.values() {
            let (row, col) = to_cell(&hospital.position);
            grid[row][col] = 'H';
        }
        for ambulance in self.ambulances.values() {
            let (row, col) = to_cell(&ambulance.position);
            grid[row][col] = match ambulance.state {
                AmbulanceState::Idle => 'a',
                AmbulanceState::Ramping { .. } => 'R',
                _ => 'A',
            };
        }

        println!("+{}+", "-".repeat(COLS));
        for row in grid {
            println!("|{}|", row.into_iter().collect::<String>());
        }
        println!("+{}+", "-".repeat(COLS));
        println!("h=house !=patient waiting H=hospital a=idle A=busy R=ramping");
    }
}
