//! Outcome sinks - where loop cycles report to

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::types::IterationRecord;

/// Receives one record per loop cycle
///
/// Called concurrently from every running loop; implementations serialize
/// their own access to shared resources. A sink must not panic or block for
/// long, since it runs inline in the loop between the action and the sleep.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: &IterationRecord);
}

/// Sink that emits each record as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, record: &IterationRecord) {
        match &record.error {
            None => info!(
                task_id = %record.task_id,
                task = %record.task_name,
                iteration = record.iteration,
                duration_ms = record.duration_ms,
                "Scheduled task completed"
            ),
            Some(error) => warn!(
                task_id = %record.task_id,
                task = %record.task_name,
                iteration = record.iteration,
                duration_ms = record.duration_ms,
                %error,
                "Scheduled task error"
            ),
        }
    }
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<IterationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far
    pub fn records(&self) -> Vec<IterationRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Records for one task name, in arrival order
    pub fn records_for(&self, task_name: &str) -> Vec<IterationRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.task_name == task_name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutcomeSink for MemorySink {
    fn record(&self, record: &IterationRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}

/// Sink that forwards every record to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style)
    pub fn with(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutcomeSink for FanoutSink {
    fn record(&self, record: &IterationRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
