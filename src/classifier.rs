//! Confidence-scored category prediction against a trained weight table.
//!
//! Scoring is pure and deterministic: identical `(FeatureVector,
//! WeightTable)` input always yields the identical outcome. The absence of
//! a usable model is expressed as a variant, not an error, so the caller
//! chooses the fallback strategy.

use crate::types::{Category, Classification, ClassificationSource, FeatureVector, WeightTable};
use tracing::debug;

/// Likelihood applied for a `(keyword, category)` pair never seen at
/// training time
const UNSEEN_LIKELIHOOD: f64 = 0.5;

/// Score multiplier applied when the urgency feature fires
const URGENCY_BOOST: f64 = 0.2;

/// Score multiplier scaled by the length feature
const LENGTH_BOOST: f64 = 0.1;

/// Outcome of scoring a feature vector
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    /// A category was predicted with normalized confidence
    Classified(Classification),

    /// The weight table is empty or produced no usable scores; the caller
    /// should fall through to the fallback classifier
    NoModelAvailable,
}

/// Naive-Bayes classifier over a trained weight table
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    /// Raw per-category scores, normalized to sum to 1.
    ///
    /// Returned in enumeration order of [`Category`], covering exactly the
    /// categories present in the table. Empty when the table is empty or
    /// the score mass is degenerate.
    pub fn confidences(
        &self,
        features: &FeatureVector,
        table: &WeightTable,
    ) -> Vec<(Category, f64)> {
        if table.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<(Category, f64)> = table
            .categories
            .iter()
            .map(|(&category, weights)| {
                let mut score = weights.prior;
                for matched in &features.matched_categories {
                    let likelihood = weights
                        .likelihoods
                        .get(matched.as_str())
                        .copied()
                        .unwrap_or(UNSEEN_LIKELIHOOD);
                    score *= likelihood;
                }

                score *= 1.0 + URGENCY_BOOST * features.urgency_score;
                score *= 1.0 + LENGTH_BOOST * features.length_score;

                (category, score)
            })
            .collect();

        let total: f64 = scores.iter().map(|(_, s)| s).sum();
        if !total.is_finite() || total <= 0.0 {
            return Vec::new();
        }

        for (_, score) in &mut scores {
            *score /= total;
        }
        scores
    }

    /// Score a feature vector against a weight table.
    ///
    /// Ties are broken by enumeration order: the first category with the
    /// maximal confidence wins.
    pub fn score(&self, features: &FeatureVector, table: &WeightTable) -> ScoreOutcome {
        let confidences = self.confidences(features, table);

        let mut best: Option<(Category, f64)> = None;
        for (category, confidence) in confidences {
            match best {
                Some((_, top)) if confidence <= top => {}
                _ => best = Some((category, confidence)),
            }
        }

        match best {
            Some((category, confidence)) => {
                debug!(%category, confidence, "Classified by trained model");
                ScoreOutcome::Classified(Classification {
                    category,
                    confidence,
                    reasoning: None,
                    source: ClassificationSource::Model,
                })
            }
            None => ScoreOutcome::NoModelAvailable,
        }
    }
}
