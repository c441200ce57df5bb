//! Timeline events and the bounded user-facing log.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Normal,
    Anomaly,
}

/// Why a transition was out of sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyKind {
    /// Jumped past the next expected state
    Skip,
    /// Went back to an earlier state other than the first
    Regression,
}

/// Classify a transition by list position.
///
/// Moving to the first state is a cycle restart and never an anomaly.
pub fn classify(from_index: usize, to_index: usize) -> Option<AnomalyKind> {
    if to_index > from_index + 1 {
        Some(AnomalyKind::Skip)
    } else if to_index < from_index && to_index != 0 {
        Some(AnomalyKind::Regression)
    } else {
        None
    }
}

/// A completed stay in one state, recorded when the track leaves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub track_id: u64,
    /// State display name
    pub state: String,
    pub state_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(rename = "isVA")]
    pub is_va: bool,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<AnomalyKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogKind {
    System,
    Transition,
    Anomaly,
    #[serde(rename = "Cycle Complete")]
    CycleComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: f64,
    pub track_id: u64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

/// Ring of the most recent log entries, newest first.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: Vec<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    pub fn push(&mut self, timestamp: f64, track_id: u64, kind: LogKind, message: String) {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            0,
            LogEntry {
                id,
                timestamp,
                track_id,
                kind,
                message,
            },
        );
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Drop all entries; ids keep increasing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
