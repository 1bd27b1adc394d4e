//! Live simulation runtime
//!
//! One shared [`SimWorld`] behind a tokio mutex, driven by independent
//! periodic tasks: motion, dispatch, the hospital queue manager, the patient
//! generator and a broadcaster feeding connected clients. Generation work runs
//! on a [`WorkerPool`] and merges its result back under the lock, tagged with
//! the world epoch it was started for so results that outlive a reset are
//! dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

use crate::export::FhirExporter;
use crate::generation::{
    ollama, pool, synthea, ConditionGenerator, EncounterGenerator, IdentityProvider,
    LocalConditionGenerator, LocalIdentityProvider, OllamaGenerator, PatientGenerator,
    SyntheaIdentityProvider, TemplateEncounterGenerator, WorkerPool, DEFAULT_PROVIDER_TIMEOUT,
};
use crate::simulation::{
    ConfigPatch, EncounterRecord, EncounterRequest, EventLog, HouseId, Patient, PatientId,
    PositionsSnapshot, RecordRequest, SimConfig, SimWorld, WorldSnapshot,
};

/// Default listen address for the web UI
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

pub const MOTION_INTERVAL: Duration = Duration::from_millis(25);
pub const DISPATCH_INTERVAL: Duration = Duration::from_secs(1);
pub const QUEUE_INTERVAL: Duration = Duration::from_secs(1);
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);

/// Broadcast ticks between full state pushes when nothing was logged
const FULL_STATE_EVERY: u64 = 10;
const STREAM_CAPACITY: usize = 1024;

/// Everything the command line can set about a live run
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config: SimConfig,
    pub llm_model: String,
    pub ollama_url: String,
    pub synthea_url: String,
    pub use_llm: bool,
    pub use_synthea: bool,
    pub provider_timeout: Duration,
    pub pool_size: usize,
    pub export_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config: SimConfig::default(),
            llm_model: ollama::DEFAULT_MODEL.to_string(),
            ollama_url: ollama::DEFAULT_OLLAMA_URL.to_string(),
            synthea_url: synthea::DEFAULT_SYNTHEA_URL.to_string(),
            use_llm: true,
            use_synthea: true,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            pool_size: pool::DEFAULT_POOL_SIZE,
            export_dir: None,
            seed: None,
        }
    }
}

impl RuntimeOptions {
    /// Wire up the providers the options ask for
    pub fn generator(&self) -> PatientGenerator {
        let identities: Arc<dyn IdentityProvider> = if self.use_synthea {
            Arc::new(SyntheaIdentityProvider::new(&self.synthea_url))
        } else {
            Arc::new(LocalIdentityProvider)
        };

        let (conditions, encounters): (Arc<dyn ConditionGenerator>, Arc<dyn EncounterGenerator>) =
            if self.use_llm {
                let ollama = Arc::new(OllamaGenerator::new(&self.ollama_url, &self.llm_model));
                (ollama.clone(), ollama)
            } else {
                (
                    Arc::new(LocalConditionGenerator),
                    Arc::new(TemplateEncounterGenerator),
                )
            };

        PatientGenerator::new(identities, conditions, encounters, self.provider_timeout)
    }
}

/// Messages pushed to stream subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    State(Box<WorldSnapshot>),
    Positions(PositionsSnapshot),
    Log(EventLog),
    Warning(String),
}

#[derive(Clone)]
pub struct Simulation {
    world: Arc<Mutex<SimWorld>>,
    generator: PatientGenerator,
    pool: WorkerPool,
    exporter: Option<FhirExporter>,
    updates: broadcast::Sender<StreamMessage>,
    seed: Option<u64>,
}

impl Simulation {
    pub fn new(options: &RuntimeOptions) -> Result<Self> {
        let exporter = match &options.export_dir {
            Some(root) => Some(FhirExporter::create(root)?),
            None => None,
        };
        let mut simulation = Self::with_generator(
            options.config.clone(),
            options.generator(),
            WorkerPool::new(options.pool_size),
            exporter,
        );
        if let Some(seed) = options.seed {
            simulation.seed = Some(seed);
            simulation.world = Arc::new(Mutex::new(SimWorld::from_config_with_seed(
                options.config.clone(),
                seed,
            )));
        }
        Ok(simulation)
    }

    pub fn with_generator(
        config: SimConfig,
        generator: PatientGenerator,
        pool: WorkerPool,
        exporter: Option<FhirExporter>,
    ) -> Self {
        let (updates, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            world: Arc::new(Mutex::new(SimWorld::from_config(config))),
            generator,
            pool,
            exporter,
            updates,
            seed: None,
        }
    }

    pub fn world(&self) -> Arc<Mutex<SimWorld>> {
        Arc::clone(&self.world)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> WorldSnapshot {
        self.world.lock().await.snapshot()
    }

    pub async fn config(&self) -> SimConfig {
        self.world.lock().await.config.clone()
    }

    /// Spawn every periodic loop
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!("Starting simulation loops");
        vec![
            tokio::spawn(self.clone().motion_loop()),
            tokio::spawn(self.clone().dispatch_loop()),
            tokio::spawn(self.clone().queue_loop()),
            tokio::spawn(self.clone().generation_loop()),
            tokio::spawn(self.clone().broadcast_loop()),
        ]
    }

    async fn motion_loop(self) {
        let mut ticker = interval(MOTION_INTERVAL);
        loop {
            ticker.tick().await;
            self.world
                .lock()
                .await
                .move_ambulances(MOTION_INTERVAL.as_secs_f32());
        }
    }

    async fn dispatch_loop(self) {
        let mut ticker = interval(DISPATCH_INTERVAL);
        loop {
            ticker.tick().await;
            let assigned = self.world.lock().await.assign_ambulances();
            if assigned > 0 {
                debug!("Dispatched {} ambulance(s)", assigned);
            }
        }
    }

    async fn queue_loop(self) {
        let mut ticker = interval(QUEUE_INTERVAL);
        loop {
            ticker.tick().await;
            self.run_queue_pass().await;
        }
    }

    /// One queue pass. Discharges are closed on the spot unless their
    /// encounter is still on the worker pool; encounters go to the pool.
    pub async fn run_queue_pass(&self) -> Vec<JoinHandle<()>> {
        let mut world = self.world.lock().await;
        let epoch = world.epoch();
        let requests = world.manage_hospital_queues();

        let mut pending = Vec::new();
        let mut exports = Vec::new();
        for request in requests {
            match request {
                RecordRequest::Encounter(request) => {
                    world.expect_encounter(&request.patient_id);
                    pending.push(request);
                }
                RecordRequest::Discharge {
                    patient_id,
                    hospital_id,
                } => {
                    if let Some(record) = world.complete_discharge(&patient_id, hospital_id) {
                        let sequence = history_len(&world, &patient_id);
                        exports.push((patient_id, sequence, record));
                    }
                }
            }
        }
        drop(world);

        for (patient_id, sequence, record) in &exports {
            self.export_encounter(patient_id, *sequence, record);
        }
        pending
            .into_iter()
            .map(|request| self.spawn_encounter(epoch, request))
            .collect()
    }

    fn spawn_encounter(&self, epoch: u64, request: EncounterRequest) -> JoinHandle<()> {
        let simulation = self.clone();
        self.pool.spawn(async move {
            let record = simulation.generator.generate_encounter(&request).await;

            let mut world = simulation.world.lock().await;
            if world.epoch() != epoch {
                debug!(
                    "Discarding encounter for {} generated before reset",
                    request.patient_id
                );
                return;
            }
            let appended = world.attach_encounter(&request.patient_id, request.hospital_id, record);
            let first = history_len(&world, &request.patient_id) + 1 - appended.len();
            drop(world);

            for (offset, record) in appended.iter().enumerate() {
                simulation.export_encounter(&request.patient_id, first + offset, record);
            }
        })
    }

    async fn generation_loop(self) {
        loop {
            let (min, max) = {
                let world = self.world.lock().await;
                (
                    world.config.generation_interval_min_secs,
                    world.config.generation_interval_max_secs,
                )
            };
            sleep(generation_delay(min, max)).await;
            self.spawn_random_patient();
        }
    }

    /// Generate and place a random patient on the worker pool
    pub fn spawn_random_patient(&self) -> JoinHandle<()> {
        let simulation = self.clone();
        self.pool.spawn(async move {
            simulation.generate_random_patient().await;
        })
    }

    /// Generate a patient through the providers and place them at a random
    /// house. Returns `None` if the world was reset meanwhile or has no houses.
    pub async fn generate_random_patient(&self) -> Option<PatientId> {
        let epoch = self.world.lock().await.epoch();
        let patient = self.generator.generate_patient().await;

        let mut world = self.world.lock().await;
        if world.epoch() != epoch {
            debug!("Discarding patient {} generated before reset", patient.id);
            return None;
        }

        let generated_id = patient.id.clone();
        let patient_id = match world.admit_patient(patient, None) {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping generated patient {}: {:#}", generated_id, e);
                return None;
            }
        };
        let exported = match &self.exporter {
            Some(_) => world.patients.get(&patient_id).cloned(),
            None => None,
        };
        drop(world);

        if let Some(patient) = exported {
            self.export_patient(&patient);
        }
        self.publish_state().await;
        Some(patient_id)
    }

    /// Manual trigger: local patient at a specific house, right now
    pub async fn create_patient_at_house(&self, house_id: HouseId) -> Result<Option<PatientId>> {
        let mut world = self.world.lock().await;
        let Some(patient_id) = world.create_patient_at_house(house_id)? else {
            return Ok(None);
        };
        let exported = match &self.exporter {
            Some(_) => world.patients.get(&patient_id).cloned(),
            None => None,
        };
        drop(world);

        if let Some(patient) = exported {
            self.export_patient(&patient);
        }
        self.publish_state().await;
        Ok(Some(patient_id))
    }

    /// Rebuild the world from the current config with `patch` applied
    pub async fn reset(&self, patch: &ConfigPatch) -> SimConfig {
        let mut world = self.world.lock().await;
        let config = patch.apply(&world.config);
        let fresh = match self.seed {
            Some(seed) => SimWorld::from_config_with_seed(config.clone(), seed),
            None => SimWorld::from_config(config.clone()),
        }
        .succeeding(&world);
        *world = fresh;
        info!(
            "Simulation reset: {} houses, {} hospitals, {} ambulances",
            config.house_count, config.hospital_count, config.ambulance_count
        );
        drop(world);

        self.publish_state().await;
        config
    }

    pub async fn publish_state(&self) {
        if self.updates.receiver_count() == 0 {
            return;
        }
        let snapshot = self.snapshot().await;
        let _ = self.updates.send(StreamMessage::State(Box::new(snapshot)));
    }

    async fn broadcast_loop(self) {
        let mut ticker = interval(BROADCAST_INTERVAL);
        let mut last_seen = None;
        let mut ticks: u64 = 0;
        loop {
            ticker.tick().await;
            ticks += 1;
            if self.updates.receiver_count() == 0 {
                continue;
            }

            let (message, log) = {
                let world = self.world.lock().await;
                let seen = (world.epoch(), world.events.revision);
                let changed = last_seen != Some(seen);
                last_seen = Some(seen);

                let message = if changed || ticks % FULL_STATE_EVERY == 0 {
                    StreamMessage::State(Box::new(world.snapshot()))
                } else {
                    StreamMessage::Positions(world.positions())
                };
                (message, changed.then(|| world.events.clone()))
            };

            let _ = self.updates.send(message);
            if let Some(log) = log {
                let _ = self.updates.send(StreamMessage::Log(log));
            }
        }
    }

    fn export_patient(&self, patient: &Patient) {
        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export_patient(patient) {
                warn!("FHIR export failed for {}: {:#}", patient.id, e);
            }
        }
    }

    fn export_encounter(&self, patient_id: &PatientId, sequence: usize, record: &EncounterRecord) {
        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export_encounter(patient_id, sequence, record) {
                warn!("FHIR export failed for {}: {:#}", patient_id, e);
            }
        }
    }
}

/// Number of records in a patient's history
fn history_len(world: &SimWorld, patient_id: &PatientId) -> usize {
    world
        .patients
        .get(patient_id)
        .map(|p| p.encounters.len())
        .unwrap_or(0)
}

/// Random delay within the configured bounds, in whole seconds
fn generation_delay(min_secs: u64, max_secs: u64) -> Duration {
    let (low, high) = if min_secs <= max_secs {
        (min_secs, max_secs)
    } else {
        (max_secs, min_secs)
    };
    let secs = rand::rng().random_range(low..=high);
    Duration::from_secs(secs).max(MOTION_INTERVAL)
}

