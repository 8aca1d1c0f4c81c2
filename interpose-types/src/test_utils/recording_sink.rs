//! RecordingSink: keeps every dispatch event for inspection.

use crate::sink::{DispatchEvent, ObservabilitySink};
use std::sync::Mutex;

/// A sink that records every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, event: &DispatchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
