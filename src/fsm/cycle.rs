//! Cycle segmentation of the timeline and throughput statistics.

use serde::{Deserialize, Serialize};

use crate::fsm::model::LoadedModel;
use crate::fsm::timeline::TimelineEvent;

/// Policy deciding where one work cycle ends and the next begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CycleBoundary {
    /// Leaving one of these states closes the current cycle
    pub terminal_states: Vec<String>,
    /// Entering one of these states reports cycle statistics to the observer
    pub sentinel_states: Vec<String>,
    /// A return to the first state in list order starts a new cycle
    pub split_on_restart: bool,
}

impl Default for CycleBoundary {
    fn default() -> Self {
        Self {
            terminal_states: vec!["complete".into(), "s_complete".into()],
            sentinel_states: vec!["s_start".into(), "complete".into(), "s_complete".into()],
            split_on_restart: true,
        }
    }
}

impl CycleBoundary {
    pub fn is_terminal(&self, state_id: &str) -> bool {
        self.terminal_states.iter().any(|s| s == state_id)
    }

    pub fn is_sentinel(&self, state_id: &str) -> bool {
        self.sentinel_states.iter().any(|s| s == state_id)
    }
}

/// One contiguous run of timeline events for a single track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub track_id: u64,
    pub duration: f64,
    pub va_duration: f64,
    pub events: Vec<TimelineEvent>,
}

impl Cycle {
    fn new(events: Vec<TimelineEvent>) -> Self {
        let track_id = events.first().map_or(0, |e| e.track_id);
        let duration = events.iter().map(|e| e.duration).sum();
        let va_duration = events.iter().filter(|e| e.is_va).map(|e| e.duration).sum();
        Self {
            track_id,
            duration,
            va_duration,
            events,
        }
    }

    fn end_time(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatistics {
    pub total_cycles: usize,
    pub avg_cycle_time: f64,
    pub avg_va_time: f64,
    /// Value-added share of total time, in percent
    pub va_ratio: f64,
    pub latest_cycle: Cycle,
    /// All cycles ordered by completion time
    pub history: Vec<Cycle>,
}

impl CycleStatistics {
    /// Segment `timeline` into cycles and aggregate them.
    ///
    /// Events are partitioned per track first so interleaved operators do not
    /// split each other's cycles. A trailing incomplete run counts as a cycle.
    /// Returns `None` for an empty timeline.
    pub fn compute(
        timeline: &[TimelineEvent],
        model: &LoadedModel,
        boundary: &CycleBoundary,
    ) -> Option<Self> {
        let mut track_ids: Vec<u64> = timeline.iter().map(|e| e.track_id).collect();
        track_ids.sort_unstable();
        track_ids.dedup();

        let mut cycles = Vec::new();
        for track_id in track_ids {
            let events: Vec<&TimelineEvent> =
                timeline.iter().filter(|e| e.track_id == track_id).collect();
            let mut run = Vec::new();
            for (i, event) in events.iter().enumerate() {
                run.push((*event).clone());
                let restart = boundary.split_on_restart
                    && events.get(i + 1).is_some_and(|next| {
                        model.index_of(&next.state_id) == Some(0)
                            && model.index_of(&event.state_id).is_some_and(|idx| idx > 0)
                    });
                if boundary.is_terminal(&event.state_id) || restart {
                    cycles.push(Cycle::new(std::mem::take(&mut run)));
                }
            }
            if !run.is_empty() {
                cycles.push(Cycle::new(run));
            }
        }

        cycles.sort_by(|a, b| a.end_time().total_cmp(&b.end_time()));
        let latest_cycle = cycles.last()?.clone();

        let count = cycles.len() as f64;
        let total: f64 = cycles.iter().map(|c| c.duration).sum();
        let total_va: f64 = cycles.iter().map(|c| c.va_duration).sum();
        let va_ratio = if total > 0.0 { total_va / total * 100.0 } else { 0.0 };

        Some(Self {
            total_cycles: cycles.len(),
            avg_cycle_time: total / count,
            avg_va_time: total_va / count,
            va_ratio,
            latest_cycle,
            history: cycles,
        })
    }
}
