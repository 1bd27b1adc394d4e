//! Ambulance Dispatch Simulation Library
//!
//! A dispatch simulation that can run headless or behind a web UI, with
//! optional LLM-generated FHIR records.

pub mod export;
pub mod generation;
pub mod runtime;
pub mod simulation;

#[cfg(feature = "ui")]
pub mod ui;
