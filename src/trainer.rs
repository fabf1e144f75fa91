//! Supervised Naive-Bayes training from user-correction feedback.
//!
//! Builds a [`WeightTable`] from labeled feature vectors: per-category
//! priors plus add-one (Laplace) smoothed keyword likelihoods. Training is
//! deterministic for a fixed sample ordering; there is no randomness.

use crate::error::{MailroomError, Result};
use crate::types::{Category, CategoryWeights, TrainingSample, WeightTable};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Minimum number of labeled samples required to train
pub const MIN_TRAINING_SAMPLES: usize = 50;

/// Naive-Bayes weight-table trainer
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveBayesTrainer;

impl NaiveBayesTrainer {
    pub fn new() -> Self {
        Self
    }

    /// Train a weight table from labeled samples.
    ///
    /// Fails with [`MailroomError::InsufficientData`] below
    /// [`MIN_TRAINING_SAMPLES`]; the caller's active model is untouched.
    pub fn train(&self, samples: &[TrainingSample]) -> Result<WeightTable> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(MailroomError::InsufficientData {
                got: samples.len(),
                need: MIN_TRAINING_SAMPLES,
            });
        }

        let total = samples.len() as f64;

        // count(c) and count(k in c), where keyword features are the names
        // of the categories the extractor matched.
        let mut category_counts: BTreeMap<Category, usize> = BTreeMap::new();
        let mut keyword_counts: BTreeMap<Category, BTreeMap<String, usize>> = BTreeMap::new();

        for sample in samples {
            *category_counts.entry(sample.category).or_insert(0) += 1;
            let keywords = keyword_counts.entry(sample.category).or_default();
            for matched in &sample.features.matched_categories {
                *keywords.entry(matched.as_str().to_string()).or_insert(0) += 1;
            }
        }

        let mut table = WeightTable::default();
        for (category, count) in &category_counts {
            let prior = *count as f64 / total;

            // Laplace smoothing: (count + 1) / (count(c) + 2), so unseen
            // keywords never collapse a product to zero.
            let likelihoods: BTreeMap<String, f64> = keyword_counts
                .get(category)
                .map(|keywords| {
                    keywords
                        .iter()
                        .map(|(keyword, &hits)| {
                            let likelihood = (hits as f64 + 1.0) / (*count as f64 + 2.0);
                            (keyword.clone(), likelihood)
                        })
                        .collect()
                })
                .unwrap_or_default();

            debug!(
                category = %category,
                prior,
                keywords = likelihoods.len(),
                "Trained category weights"
            );

            table
                .categories
                .insert(*category, CategoryWeights { prior, likelihoods });
        }

        info!(
            samples = samples.len(),
            categories = table.categories.len(),
            "Trained Naive-Bayes weight table"
        );

        Ok(table)
    }
}
