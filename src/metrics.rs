//! Model quality evaluation.
//!
//! Re-predicts every training sample with a freshly trained weight table
//! and computes accuracy plus per-category precision, recall and F1.
//!
//! Evaluation is in-sample: the same data trains and scores the model. No
//! held-out split exists in this system; the reported accuracy is therefore
//! optimistic and is used only by the retraining policy.

use crate::classifier::{Classifier, ScoreOutcome};
use crate::types::{Category, ModelMetrics, TrainingSample, WeightTable};
use std::collections::BTreeMap;
use tracing::info;

/// In-sample metrics evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEvaluator {
    classifier: Classifier,
}

impl MetricsEvaluator {
    pub fn new() -> Self {
        Self {
            classifier: Classifier::new(),
        }
    }

    /// Evaluate a trained table against the set that built it
    pub fn evaluate(&self, table: &WeightTable, samples: &[TrainingSample]) -> ModelMetrics {
        let mut correct_total = 0usize;
        let mut predicted_counts: BTreeMap<Category, usize> = BTreeMap::new();
        let mut actual_counts: BTreeMap<Category, usize> = BTreeMap::new();
        let mut true_positives: BTreeMap<Category, usize> = BTreeMap::new();

        for sample in samples {
            *actual_counts.entry(sample.category).or_insert(0) += 1;

            let predicted = match self.classifier.score(&sample.features, table) {
                ScoreOutcome::Classified(classification) => classification.category,
                // An empty table cannot reach evaluation through training,
                // but a degenerate score falls through to the catch-all.
                ScoreOutcome::NoModelAvailable => Category::Other,
            };

            *predicted_counts.entry(predicted).or_insert(0) += 1;
            if predicted == sample.category {
                correct_total += 1;
                *true_positives.entry(predicted).or_insert(0) += 1;
            }
        }

        let mut precision_by_category = BTreeMap::new();
        let mut recall_by_category = BTreeMap::new();
        let mut f1_by_category = BTreeMap::new();

        for category in Category::ALL {
            let tp = true_positives.get(&category).copied().unwrap_or(0) as f64;
            let predicted = predicted_counts.get(&category).copied().unwrap_or(0);
            let actual = actual_counts.get(&category).copied().unwrap_or(0);

            // Zero-sample categories report 0, never NaN.
            let precision = if predicted == 0 { 0.0 } else { tp / predicted as f64 };
            let recall = if actual == 0 { 0.0 } else { tp / actual as f64 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            precision_by_category.insert(category, precision);
            recall_by_category.insert(category, recall);
            f1_by_category.insert(category, f1);
        }

        let accuracy = if samples.is_empty() {
            0.0
        } else {
            correct_total as f64 / samples.len() as f64
        };

        info!(
            samples = samples.len(),
            accuracy,
            "Evaluated trained model (in-sample)"
        );

        ModelMetrics {
            accuracy,
            precision_by_category,
            recall_by_category,
            f1_by_category,
            total_samples: samples.len(),
        }
    }
}
