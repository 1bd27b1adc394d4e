//! Rolling event logs shown in the UI panels

use std::collections::VecDeque;

use chrono::Local;
use log::info;
use serde::Serialize;

/// Entries kept per category
pub const EVENT_LOG_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Patient,
    Ambulance,
    Hospital,
}

impl EventCategory {
    fn log_target(self) -> &'static str {
        match self {
            EventCategory::Patient => "ambulance_sim::patient",
            EventCategory::Ambulance => "ambulance_sim::ambulance",
            EventCategory::Hospital => "ambulance_sim::hospital",
        }
    }
}

/// Most recent first, bounded per category
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventLog {
    pub patient: VecDeque<String>,
    pub ambulance: VecDeque<String>,
    pub hospital: VecDeque<String>,
    /// Bumped on every push so broadcasters can tell when to resend
    pub revision: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: EventCategory, message: impl Into<String>) {
        let message = message.into();
        info!(target: category.log_target(), "{}", message);

        let entry = format!("{} - {}", Local::now().format("%H:%M:%S"), message);
        let entries = self.entries_mut(category);
        entries.push_front(entry);
        entries.truncate(EVENT_LOG_CAPACITY);
        self.revision += 1;
    }

    pub fn entries(&self, category: EventCategory) -> &VecDeque<String> {
        match category {
            EventCategory::Patient => &self.patient,
            EventCategory::Ambulance => &self.ambulance,
            EventCategory::Hospital => &self.hospital,
        }
    }

    fn entries_mut(&mut self, category: EventCategory) -> &mut VecDeque<String> {
        match category {
            EventCategory::Patient => &mut self.patient,
            EventCategory::Ambulance => &mut self.ambulance,
            EventCategory::Hospital => &mut self.hospital,
        }
    }
}
