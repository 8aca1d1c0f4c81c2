//! Forward events to several sinks.

use interpose_types::{DispatchEvent, ObservabilitySink};
use std::sync::Arc;

/// Forwards every event to each inner sink in the order they were added.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservabilitySink>>,
}

impl FanoutSink {
    /// An empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the end of the list.
    pub fn with(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ObservabilitySink for FanoutSink {
    fn record(&self, event: &DispatchEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}
