//! Retraining policy.
//!
//! Decides, after each feedback event, whether a training run should be
//! triggered. The check itself is cheap; the trigger runs on a spawned
//! task so feedback recording never waits on training.

use crate::types::Model;
use tracing::debug;

/// Active-model accuracy below which retraining is triggered
pub const RETRAIN_THRESHOLD: f64 = 0.85;

/// Policy deciding when to invoke the trainer
#[derive(Debug, Clone, Copy)]
pub struct RetrainingPolicy {
    threshold: f64,
}

impl Default for RetrainingPolicy {
    fn default() -> Self {
        Self {
            threshold: RETRAIN_THRESHOLD,
        }
    }
}

impl RetrainingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff no model is active, or the active model's accuracy has
    /// fallen below the threshold.
    pub fn should_retrain(&self, active: Option<&Model>) -> bool {
        let decision = match active {
            None => true,
            Some(model) => model.metrics.accuracy < self.threshold,
        };

        debug!(
            has_model = active.is_some(),
            accuracy = active.map(|m| m.metrics.accuracy),
            decision,
            "Evaluated retraining policy"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Model, ModelId, ModelMetrics, ModelType, WeightTable};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn model_with_accuracy(accuracy: f64) -> Model {
        let zeros: BTreeMap<Category, f64> =
            Category::ALL.iter().map(|&c| (c, 0.0)).collect();
        Model {
            id: ModelId::new(),
            model_type: ModelType::NaiveBayes,
            weights: WeightTable::default(),
            metrics: ModelMetrics {
                accuracy,
                precision_by_category: zeros.clone(),
                recall_by_category: zeros.clone(),
                f1_by_category: zeros,
                total_samples: 60,
            },
            trained_at: Utc::now(),
            active: true,
        }
    }

    #[test]
    fn test_retrains_when_no_model() {
        assert!(RetrainingPolicy::new().should_retrain(None));
    }

    #[test]
    fn test_retrains_below_threshold() {
        let policy = RetrainingPolicy::new();
        assert!(policy.should_retrain(Some(&model_with_accuracy(0.84))));
        assert!(!policy.should_retrain(Some(&model_with_accuracy(0.85))));
        assert!(!policy.should_retrain(Some(&model_with_accuracy(0.99))));
    }
}
