//! Feature extraction for email classification.
//!
//! Turns a raw email into the fixed-shape [`FeatureVector`] scored by the
//! classifier. Extraction is deterministic and side-effect-free: the same
//! email always produces the same vector, and nothing is persisted.

use crate::types::{Category, Email, FeatureVector};
use std::collections::BTreeSet;
use tracing::debug;

/// Text length at which `length_score` saturates to 1.0
const LENGTH_SATURATION: f64 = 1000.0;

/// Keywords whose presence marks an email as urgent
const URGENCY_KEYWORDS: &[&str] = &["urgent", "asap", "critical", "immediately", "emergency"];

/// Fixed keyword list per category. `Other` carries no keywords; it is the
/// catch-all for emails that match nothing.
fn category_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Order => &["order", "purchase order", "po number", "order confirmation"],
        Category::Adjudication => &["adjudication", "tender", "award", "bid", "proposal"],
        Category::Purchase => &["purchase", "quotation", "quote", "rfq", "price request"],
        Category::Delivery => &["delivery", "dispatch", "shipment", "shipping", "delivered"],
        Category::Invoice => &["invoice", "payment", "billing", "receipt", "statement"],
        Category::Communication => &["meeting", "schedule", "update", "notice", "reminder"],
        Category::Other => &[],
    }
}

/// Stateless email feature extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector for an email
    pub fn extract(&self, email: &Email) -> FeatureVector {
        let text = format!(
            "{} {} {}",
            email.subject,
            email.sender,
            email.text_body()
        )
        .to_lowercase();

        let mut matched_categories = BTreeSet::new();
        for category in Category::ALL {
            let hit = category_keywords(category)
                .iter()
                .any(|keyword| text.contains(keyword));
            if hit {
                matched_categories.insert(category);
            }
        }

        let urgency_score = if URGENCY_KEYWORDS.iter().any(|k| text.contains(k)) {
            1.0
        } else {
            0.0
        };

        // Length is measured on the body only; an empty body scores 0
        // regardless of subject length.
        let body_len = email.text_body().len() as f64;
        let length_score = (body_len / LENGTH_SATURATION).min(1.0);

        debug!(
            email_id = %email.id,
            matches = matched_categories.len(),
            urgency = urgency_score,
            length = length_score,
            "Extracted features"
        );

        FeatureVector {
            matched_categories,
            urgency_score,
            length_score,
        }
    }
}
