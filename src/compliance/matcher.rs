use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Deserializer, Serialize};

use crate::compliance::engine::ComplianceConfig;
use crate::dtw::MotionComparator;
use crate::pose::{Keypoint, Pose};

/// One expected work element of a standardized sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkElement {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "elementName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therblig: Option<String>,
    /// Standard duration
    #[serde(alias = "standardDuration")]
    pub duration: f64,
    /// Golden motion sequence; elements without one are never matched
    #[serde(default, alias = "referenceSequence", skip_serializing)]
    pub motion_sequence: Option<Vec<Pose>>,
}

impl WorkElement {
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            therblig: None,
            duration,
            motion_sequence: None,
        }
    }

    pub fn with_motion_sequence(mut self, sequence: Vec<Pose>) -> Self {
        self.motion_sequence = Some(sequence);
        self
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Score of one element against the live window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMatch {
    pub element_index: usize,
    pub element_id: String,
    pub element_name: String,
    /// Mean of the recent raw scores
    pub score: f64,
    /// Similarity plus contextual bias for this frame
    pub raw_score: f64,
    pub is_context_match: bool,
}

/// Scans every element with a golden sequence for the best match to the
/// live pose window.
#[derive(Debug, Clone)]
pub struct ElementMatcher {
    elements: Vec<WorkElement>,
    comparator: MotionComparator,
    config: ComplianceConfig,
    history: HashMap<usize, VecDeque<f64>>,
}

impl ElementMatcher {
    pub fn new(elements: Vec<WorkElement>, config: ComplianceConfig) -> Self {
        Self {
            comparator: MotionComparator::new(config.dtw_window_fraction, config.score_threshold),
            elements,
            config,
            history: HashMap::new(),
        }
    }

    pub fn elements(&self) -> &[WorkElement] {
        &self.elements
    }

    /// Forget all smoothing windows.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Score every element with a golden sequence, best smoothed score first.
    ///
    /// Returns nothing when the window is shorter than `min_frames`.
    pub fn score_all<P: AsRef<[Keypoint]>>(
        &mut self,
        live: &[P],
        expected_index: usize,
    ) -> Vec<ElementMatch> {
        if live.len() < self.config.min_frames {
            return Vec::new();
        }

        let mut results = Vec::new();
        for (index, element) in self.elements.iter().enumerate() {
            let Some(golden) = element.motion_sequence.as_deref() else {
                continue;
            };
            let is_context_match = index == expected_index;
            let mut raw_score = self.comparator.compare(live, golden).score;
            if is_context_match {
                raw_score += self.config.context_bias;
            }

            let window = self.history.entry(index).or_default();
            window.push_back(raw_score);
            while window.len() > self.config.smoothing_window.max(1) {
                window.pop_front();
            }
            let score = window.iter().sum::<f64>() / window.len() as f64;

            results.push(ElementMatch {
                element_index: index,
                element_id: element.id.clone(),
                element_name: element.name.clone(),
                score,
                raw_score,
                is_context_match,
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }

    /// Best element if its smoothed score clears `accept_score`.
    pub fn match_window<P: AsRef<[Keypoint]>>(
        &mut self,
        live: &[P],
        expected_index: usize,
    ) -> Option<ElementMatch> {
        let best = self.score_all(live, expected_index).into_iter().next()?;
        (best.score > self.config.accept_score).then_some(best)
    }
}
