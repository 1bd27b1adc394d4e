//! Standalone dispatch simulation module
//!
//! This module contains all the core simulation logic: entities, dispatch,
//! motion and the hospital queues. It runs without the web layer, so it can
//! be tested and run headless from the console.

mod ambulance;
mod building;
mod config;
mod dispatch;
mod event_log;
mod hospital_queue;
mod motion;
mod patient;
mod snapshot;
mod types;
mod world;

// Re-export public types for external use
pub use ambulance::{AmbulanceState, AmbulanceUpdateResult, SimAmbulance};
pub use building::{SimHospital, SimHouse};
pub use config::{
    ConfigPatch, RampPolicy, SimConfig, DEFAULT_AMBULANCE_COUNT, DEFAULT_HOSPITAL_COUNT,
    DEFAULT_HOUSE_COUNT, GENERATION_INTERVAL_MAX_SECS, GENERATION_INTERVAL_MIN_SECS,
    HOSPITAL_WAITING_CAPACITY, MAX_ENTITY_COUNT, MAX_TREATING_PER_HOSPITAL, TREATING_DURATION,
    WAITING_TIME_THRESHOLD,
};
pub use event_log::{EventCategory, EventLog, EVENT_LOG_CAPACITY};
pub use hospital_queue::{EncounterRequest, RecordRequest};
pub use patient::{
    Coding, Condition, EncounterRecord, Gender, Patient, PatientIdentity,
    CLINICAL_STATUS_SYSTEM, CONDITION_CATEGORY_SYSTEM, SNOMED_SYSTEM, VERIFICATION_STATUS_SYSTEM,
};
pub use snapshot::{
    AmbulanceRampView, AmbulanceView, HospitalView, HouseView, PositionsSnapshot, QueueEntryView,
    RampView, WorldSnapshot,
};
pub use types::{
    AmbulanceId, HospitalId, HouseId, PatientId, Position, Target, AMBULANCE_STEP,
    ARRIVAL_EPSILON,
};
pub use world::{SimStats, SimWorld, DISPATCH_INTERVAL_SECS, QUEUE_INTERVAL_SECS};
