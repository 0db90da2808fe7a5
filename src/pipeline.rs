//! Per-reading assessment pipeline
//!
//! Glues the scorer, classifier and predictor together for the live path
//! (one reading at a time) and scores stored history in parallel for the
//! report path.

use crate::models::{BaselineMetrics, Prediction, ScorePoint, ScoredReading, SensorReading, StressState};
use crate::prediction::{AdvisorySource, OverloadPredictor};
use crate::stress::StressScorer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Everything derived from a single reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingAssessment {
    pub stress_score: f64,
    pub state: StressState,
    pub prediction: Option<Prediction>,
    /// Whether the prediction should be surfaced to the patient
    pub display_prediction: bool,
}

/// Bounded ring of the most recent score points
#[derive(Debug, Clone)]
pub struct PredictionWindow {
    capacity: usize,
    points: VecDeque<ScorePoint>,
}

impl PredictionWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PredictionWindow {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a point, evicting the oldest when full
    pub fn push(&mut self, point: ScorePoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Points in arrival order
    pub fn points(&self) -> Vec<ScorePoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

pub struct StressPipeline {
    scorer: StressScorer,
    predictor: OverloadPredictor,
    prediction_enabled: bool,
}

impl StressPipeline {
    pub fn new() -> Self {
        StressPipeline {
            scorer: StressScorer::new(),
            predictor: OverloadPredictor::new(),
            prediction_enabled: true,
        }
    }

    pub fn with_components(scorer: StressScorer, predictor: OverloadPredictor) -> Self {
        StressPipeline {
            scorer,
            predictor,
            prediction_enabled: true,
        }
    }

    /// Patient-level prediction feature flag; when off, nothing is displayed
    pub fn with_prediction_enabled(mut self, enabled: bool) -> Self {
        self.prediction_enabled = enabled;
        self
    }

    pub fn scorer(&self) -> &StressScorer {
        &self.scorer
    }

    pub fn predictor(&self) -> &OverloadPredictor {
        &self.predictor
    }

    /// Score, classify and predict for one reading. `recent` holds earlier
    /// score points of the same patient, oldest first.
    pub fn assess(
        &self,
        reading: &SensorReading,
        baseline: &BaselineMetrics,
        recent: &[ScorePoint],
    ) -> ReadingAssessment {
        let (stress_score, state) = self.scorer.assess(reading, baseline);
        let prediction = self
            .predictor
            .predict(recent, ScorePoint::new(reading.timestamp, stress_score));
        self.finish(stress_score, state, prediction)
    }

    /// Same as [`assess`](Self::assess), consulting an advisory source
    pub async fn assess_with_advisory(
        &self,
        reading: &SensorReading,
        baseline: &BaselineMetrics,
        recent: &[ScorePoint],
        advisory: &dyn AdvisorySource,
    ) -> ReadingAssessment {
        let (stress_score, state) = self.scorer.assess(reading, baseline);
        let prediction = self
            .predictor
            .predict_with_advisory(recent, ScorePoint::new(reading.timestamp, stress_score), advisory)
            .await;
        self.finish(stress_score, state, prediction)
    }

    fn finish(&self, stress_score: f64, state: StressState, prediction: Option<Prediction>) -> ReadingAssessment {
        let display_prediction = self
            .predictor
            .should_display(prediction.as_ref(), self.prediction_enabled);

        debug!(stress_score, %state, ?prediction, display_prediction, "Reading assessed");

        ReadingAssessment {
            stress_score,
            state,
            prediction,
            display_prediction,
        }
    }

    /// Score stored readings in parallel. Output order matches input order.
    pub fn score_history(&self, readings: &[SensorReading], baseline: &BaselineMetrics) -> Vec<ScoredReading> {
        let scored: Vec<ScoredReading> = readings
            .par_iter()
            .map(|r| ScoredReading::new(r.clone(), self.scorer.score(r, baseline)))
            .collect();

        info!(readings = scored.len(), "Scored reading history");
        scored
    }

    /// Replay readings in time order through a sliding prediction window
    pub fn replay(&self, readings: &[SensorReading], baseline: &BaselineMetrics) -> Vec<(SensorReading, ReadingAssessment)> {
        let mut ordered: Vec<&SensorReading> = readings.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut window = PredictionWindow::new(self.predictor.config().window_size);
        ordered
            .into_iter()
            .map(|reading| {
                let assessment = self.assess(reading, baseline, &window.points());
                window.push(ScorePoint::new(reading.timestamp, assessment.stress_score));
                (reading.clone(), assessment)
            })
            .collect()
    }
}

impl Default for StressPipeline {
    fn default() -> Self {
        Self::new()
    }
}
