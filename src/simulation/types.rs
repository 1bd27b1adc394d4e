//! Core types for the dispatch simulation
//!
//! Identifiers, positions and the ambulance target variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-axis distance an ambulance covers in one motion tick
pub const AMBULANCE_STEP: f32 = 2.0;

/// Distance below which an ambulance counts as arrived at its target
pub const ARRIVAL_EPSILON: f32 = 0.5;

/// A wrapper type for house IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseId(pub usize);

/// A wrapper type for hospital IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HospitalId(pub usize);

/// A wrapper type for ambulance IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AmbulanceId(pub usize);

/// Patient identifiers come from the identity provider, so they are strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HospitalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AmbulanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D position in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Move each axis independently by at most `step` toward `target`.
    ///
    /// An axis within `step` of the target snaps onto it, so positions never
    /// overshoot and diagonal moves finish one axis before the other.
    pub fn step_towards(&self, target: &Position, step: f32) -> Position {
        Position {
            x: approach(self.x, target.x, step),
            y: approach(self.y, target.y, step),
        }
    }
}

fn approach(current: f32, target: f32, step: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= step {
        target
    } else {
        current + step * delta.signum()
    }
}

/// Where an ambulance is heading, carrying both identity and coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    House { id: HouseId, position: Position },
    Hospital { id: HospitalId, position: Position },
}

impl Target {
    pub fn position(&self) -> Position {
        match self {
            Target::House { position, .. } | Target::Hospital { position, .. } => *position,
        }
    }
}
