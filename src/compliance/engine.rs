use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compliance::matcher::{ElementMatch, ElementMatcher, WorkElement};
use crate::pose::Keypoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComplianceConfig {
    /// Shortest live window worth scoring
    pub min_frames: usize,
    /// Normalized DTW distance that maps to a score of zero
    pub score_threshold: f64,
    /// Points added to the expected element before smoothing
    pub context_bias: f64,
    /// Samples in each element's rolling score window
    pub smoothing_window: usize,
    /// Smoothed score a match must exceed
    pub accept_score: f64,
    /// Multiple of the standard duration that counts as an overrun
    pub overrun_factor: f64,
    /// Minimum spacing between overrun records of one step
    pub overrun_debounce: f64,
    pub dtw_window_fraction: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            min_frames: 5,
            score_threshold: 50.0,
            context_bias: 10.0,
            smoothing_window: 5,
            accept_score: 70.0,
            overrun_factor: 1.5,
            overrun_debounce: 5.0,
            dtw_window_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyDetail {
    #[serde(rename_all = "camelCase")]
    SequenceMismatch {
        expected_step: Option<String>,
        detected_step: String,
        score: f64,
    },
    #[serde(rename_all = "camelCase")]
    CtOverrun {
        step: String,
        actual: f64,
        standard: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub timestamp: f64,
    #[serde(flatten)]
    pub detail: AnomalyDetail,
}

/// A closed step and how long it actually took.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStep {
    #[serde(flatten)]
    pub element: WorkElement,
    pub actual_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStatus<'a> {
    pub current_step: Option<&'a WorkElement>,
    pub step_index: usize,
    pub total_steps: usize,
    #[serde(rename = "actualCT")]
    pub actual_ct: f64,
    #[serde(rename = "ctVariance")]
    pub ct_variance: f64,
    pub is_sequence_mismatch: bool,
    pub mismatch_count: usize,
    #[serde(rename = "match")]
    pub matched: Option<ElementMatch>,
    pub history: &'a [CompletedStep],
    pub anomalies: &'a [Anomaly],
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Follows an operator through a strictly ordered list of work elements.
///
/// The step index is the single source of truth for the expected element.
/// Steps only move forward through [`SequenceComplianceEngine::advance`];
/// matches against other elements are reported as sequence mismatches.
#[derive(Debug, Clone)]
pub struct SequenceComplianceEngine {
    config: ComplianceConfig,
    matcher: ElementMatcher,
    step_index: usize,
    cycle_started_at: Option<f64>,
    step_started_at: Option<f64>,
    history: Vec<CompletedStep>,
    anomalies: Vec<Anomaly>,
    is_sequence_mismatch: bool,
    mismatch_count: usize,
    last_overrun_at: Option<f64>,
}

impl SequenceComplianceEngine {
    pub fn new(elements: Vec<WorkElement>, config: ComplianceConfig) -> Self {
        info!("Compliance engine loaded with {} elements", elements.len());
        Self {
            matcher: ElementMatcher::new(elements, config.clone()),
            config,
            step_index: 0,
            cycle_started_at: None,
            step_started_at: None,
            history: Vec::new(),
            anomalies: Vec::new(),
            is_sequence_mismatch: false,
            mismatch_count: 0,
            last_overrun_at: None,
        }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub fn elements(&self) -> &[WorkElement] {
        self.matcher.elements()
    }

    pub fn matcher(&self) -> &ElementMatcher {
        &self.matcher
    }

    pub fn matcher_mut(&mut self) -> &mut ElementMatcher {
        &mut self.matcher
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> Option<&WorkElement> {
        self.elements().get(self.step_index)
    }

    pub fn history(&self) -> &[CompletedStep] {
        &self.history
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Seconds since the first update of the current cycle.
    pub fn cycle_time(&self, now: f64) -> f64 {
        self.cycle_started_at.map_or(0.0, |start| now - start)
    }

    /// Restart at the first step, dropping history, anomalies and scores.
    pub fn reset(&mut self, now: f64) {
        self.step_index = 0;
        self.cycle_started_at = Some(now);
        self.step_started_at = Some(now);
        self.history.clear();
        self.anomalies.clear();
        self.is_sequence_mismatch = false;
        self.mismatch_count = 0;
        self.last_overrun_at = None;
        self.matcher.reset();
        debug!("Compliance engine reset at {now:.2}");
    }

    /// Score `live` against every element and feed the best match to
    /// [`SequenceComplianceEngine::update`].
    pub fn observe<P: AsRef<[Keypoint]>>(&mut self, live: &[P], now: f64) -> ComplianceStatus<'_> {
        let matched = self.matcher.match_window(live, self.step_index);
        self.update(matched.as_ref(), now)
    }

    /// Record one match result and check the current step's cycle time.
    pub fn update(&mut self, matched: Option<&ElementMatch>, now: f64) -> ComplianceStatus<'_> {
        self.cycle_started_at.get_or_insert(now);
        let step_started_at = *self.step_started_at.get_or_insert(now);
        let elapsed = now - step_started_at;

        if let Some(matched) = matched {
            if matched.element_index == self.step_index {
                self.is_sequence_mismatch = false;
            } else {
                if !self.is_sequence_mismatch {
                    let expected_step = self.current_step().map(|e| e.name.clone());
                    warn!(
                        "Sequence mismatch: expected {:?}, detected {}",
                        expected_step, matched.element_name
                    );
                    self.anomalies.push(Anomaly {
                        timestamp: now,
                        detail: AnomalyDetail::SequenceMismatch {
                            expected_step,
                            detected_step: matched.element_name.clone(),
                            score: matched.score,
                        },
                    });
                }
                self.is_sequence_mismatch = true;
                self.mismatch_count += 1;
            }
        }

        self.check_overrun(elapsed, now);
        self.status_at(elapsed, matched.cloned())
    }

    fn check_overrun(&mut self, elapsed: f64, now: f64) {
        let Some(expected) = self.elements().get(self.step_index) else {
            return;
        };
        if elapsed <= expected.duration * self.config.overrun_factor {
            return;
        }
        if self
            .last_overrun_at
            .is_some_and(|last| now - last <= self.config.overrun_debounce)
        {
            return;
        }

        let detail = AnomalyDetail::CtOverrun {
            step: expected.name.clone(),
            actual: round_tenth(elapsed),
            standard: expected.duration,
        };
        warn!(
            "Cycle time overrun on {}: {:.1}s against {:.1}s",
            expected.name, elapsed, expected.duration
        );
        self.anomalies.push(Anomaly {
            timestamp: now,
            detail,
        });
        self.last_overrun_at = Some(now);
    }

    /// Close the current step and move to the next one.
    ///
    /// Returns `false` on the last step, which stays open.
    pub fn advance(&mut self, now: f64) -> bool {
        if self.step_index + 1 >= self.elements().len() {
            return false;
        }
        let Some(element) = self.current_step().cloned() else {
            return false;
        };

        let started = self.step_started_at.unwrap_or(now);
        debug!("Step {} ({}) completed", self.step_index, element.name);
        self.history.push(CompletedStep {
            element,
            actual_duration: now - started,
        });
        self.step_index += 1;
        self.step_started_at = Some(now);
        self.is_sequence_mismatch = false;
        self.last_overrun_at = None;
        true
    }

    /// Current status without recording a match.
    pub fn status(&self, now: f64) -> ComplianceStatus<'_> {
        let elapsed = self.step_started_at.map_or(0.0, |start| now - start);
        self.status_at(elapsed, None)
    }

    fn status_at(&self, elapsed: f64, matched: Option<ElementMatch>) -> ComplianceStatus<'_> {
        let current_step = self.current_step();
        let actual_ct = round_tenth(elapsed);
        let ct_variance = current_step.map_or(0.0, |e| round_tenth(actual_ct - e.duration));
        ComplianceStatus {
            current_step,
            step_index: self.step_index,
            total_steps: self.elements().len(),
            actual_ct,
            ct_variance,
            is_sequence_mismatch: self.is_sequence_mismatch,
            mismatch_count: self.mismatch_count,
            matched,
            history: &self.history,
            anomalies: &self.anomalies,
        }
    }
}
