//! Tunable parameters for the dispatch simulation
//!
//! Constants provide the defaults; `SimConfig` is what a world is built from,
//! and `ConfigPatch` is the loosely-typed request applied on reset.

use serde::{Deserialize, Serialize};

use super::types::AMBULANCE_STEP;

/// Patients a hospital treats at once
pub const MAX_TREATING_PER_HOSPITAL: usize = 2;
/// Seconds a patient waits before becoming eligible for treatment
pub const WAITING_TIME_THRESHOLD: u32 = 1;
/// Seconds of treatment before discharge
pub const TREATING_DURATION: u32 = 30;
/// Patients a waiting room holds before arriving ambulances ramp
pub const HOSPITAL_WAITING_CAPACITY: usize = 5;

pub const DEFAULT_HOUSE_COUNT: usize = 10;
pub const DEFAULT_HOSPITAL_COUNT: usize = 3;
pub const DEFAULT_AMBULANCE_COUNT: usize = 5;

/// Bounds (seconds) of the random delay between generated patients
pub const GENERATION_INTERVAL_MIN_SECS: u64 = 3;
pub const GENERATION_INTERVAL_MAX_SECS: u64 = 10;

/// Upper bound applied to every entity count on reset
pub const MAX_ENTITY_COUNT: usize = 100;

/// What an ambulance does when the hospital's waiting room is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampPolicy {
    /// Hold the patient outside the hospital until the room drains
    #[default]
    Ramp,
    /// Try one other hospital with room, then ramp there if it is full too
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub house_count: usize,
    pub hospital_count: usize,
    pub ambulance_count: usize,
    pub max_treating_per_hospital: usize,
    pub waiting_time_threshold: u32,
    pub treating_duration: u32,
    pub hospital_waiting_capacity: usize,
    pub generation_interval_min_secs: u64,
    pub generation_interval_max_secs: u64,
    pub ambulance_step: f32,
    pub ramp_policy: RampPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            house_count: DEFAULT_HOUSE_COUNT,
            hospital_count: DEFAULT_HOSPITAL_COUNT,
            ambulance_count: DEFAULT_AMBULANCE_COUNT,
            max_treating_per_hospital: MAX_TREATING_PER_HOSPITAL,
            waiting_time_threshold: WAITING_TIME_THRESHOLD,
            treating_duration: TREATING_DURATION,
            hospital_waiting_capacity: HOSPITAL_WAITING_CAPACITY,
            generation_interval_min_secs: GENERATION_INTERVAL_MIN_SECS,
            generation_interval_max_secs: GENERATION_INTERVAL_MAX_SECS,
            ambulance_step: AMBULANCE_STEP,
            ramp_policy: RampPolicy::Ramp,
        }
    }
}

impl SimConfig {
    /// A config with no entities at all
    pub fn empty() -> Self {
        Self {
            house_count: 0,
            hospital_count: 0,
            ambulance_count: 0,
            ..Self::default()
        }
    }
}

/// Reset request as received from a client.
///
/// Counts are signed so that nonsense input can be clamped instead of
/// rejected; missing fields keep the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub house_count: Option<i64>,
    pub hospital_count: Option<i64>,
    pub ambulance_count: Option<i64>,
    pub max_treating_per_hospital: Option<i64>,
    pub waiting_time_threshold: Option<i64>,
    pub treating_duration: Option<i64>,
    pub hospital_waiting_capacity: Option<i64>,
    pub generation_interval_min_secs: Option<i64>,
    pub generation_interval_max_secs: Option<i64>,
    pub ramp_policy: Option<RampPolicy>,
}

fn clamp_count(value: i64) -> usize {
    value.clamp(0, MAX_ENTITY_COUNT as i64) as usize
}

fn clamp_secs(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

impl ConfigPatch {
    /// Apply the patch on top of `base`, clamping every value into range
    pub fn apply(&self, base: &SimConfig) -> SimConfig {
        let mut config = base.clone();

        if let Some(n) = self.house_count {
            config.house_count = clamp_count(n);
        }
        if let Some(n) = self.hospital_count {
            config.hospital_count = clamp_count(n);
        }
        if let Some(n) = self.ambulance_count {
            config.ambulance_count = clamp_count(n);
        }
        if let Some(n) = self.max_treating_per_hospital {
            config.max_treating_per_hospital = clamp_count(n);
        }
        if let Some(n) = self.hospital_waiting_capacity {
            config.hospital_waiting_capacity = clamp_count(n);
        }
        if let Some(secs) = self.waiting_time_threshold {
            config.waiting_time_threshold = clamp_secs(secs);
        }
        if let Some(secs) = self.treating_duration {
            config.treating_duration = clamp_secs(secs);
        }
        if let Some(secs) = self.generation_interval_min_secs {
            config.generation_interval_min_secs = secs.max(0) as u64;
        }
        if let Some(secs) = self.generation_interval_max_secs {
            config.generation_interval_max_secs = secs.max(0) as u64;
        }
        if config.generation_interval_min_secs > config.generation_interval_max_secs {
            std::mem::swap(
                &mut config.generation_interval_min_secs,
                &mut config.generation_interval_max_secs,
            );
        }
        if let Some(policy) = self.ramp_policy {
            config.ramp_policy = policy;
        }

        config
    }
}
