//! Core data types for the Mailroom classification engine
//!
//! This module defines the fundamental data structures used throughout
//! mailroom: ingested emails, the closed category enumeration, derived
//! feature vectors, user feedback, trained models and their weight tables.

use crate::error::MailroomError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for ingested emails
///
/// Wraps a UUID to provide type safety and prevent mixing email IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(pub Uuid);

impl EmailId {
    /// Create a new random email ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an email ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EmailId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for trained models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub Uuid);

impl ModelId {
    /// Create a new random model ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ingested email record. Never mutated after ingestion; the stored
/// prediction is the only field the pipeline writes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub subject: String,
    pub sender: String,

    /// Full message body, when available
    pub body: Option<String>,

    /// Short preview snippet, used when the full body was not ingested
    pub preview: Option<String>,

    pub received_at: DateTime<Utc>,

    /// Most recent prediction for this email, if it has been classified
    pub predicted_category: Option<Category>,
    pub predicted_confidence: Option<f64>,
}

impl Email {
    /// Create a new email record with a fresh ID and no prediction
    pub fn new(subject: impl Into<String>, sender: impl Into<String>, body: Option<String>) -> Self {
        Self {
            id: EmailId::new(),
            subject: subject.into(),
            sender: sender.into(),
            body,
            preview: None,
            received_at: Utc::now(),
            predicted_category: None,
            predicted_confidence: None,
        }
    }

    /// Body text used for feature extraction: full body if present,
    /// otherwise the preview snippet, otherwise empty.
    pub fn text_body(&self) -> &str {
        self.body
            .as_deref()
            .or(self.preview.as_deref())
            .unwrap_or("")
    }
}

/// Closed email category enumeration
///
/// Declaration order is the tie-break order for classification: when two
/// categories score identically, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Order,
    Adjudication,
    Purchase,
    Delivery,
    Invoice,
    Communication,
    Other,
}

impl Category {
    /// All categories in enumeration (tie-break) order
    pub const ALL: [Category; 7] = [
        Category::Order,
        Category::Adjudication,
        Category::Purchase,
        Category::Delivery,
        Category::Invoice,
        Category::Communication,
        Category::Other,
    ];

    /// Stable string name, used as the keyword-feature key in weight tables
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Order => "order",
            Category::Adjudication => "adjudication",
            Category::Purchase => "purchase",
            Category::Delivery => "delivery",
            Category::Invoice => "invoice",
            Category::Communication => "communication",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = MailroomError;

    /// Unknown categories are rejected, never silently accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "order" => Ok(Category::Order),
            "adjudication" => Ok(Category::Adjudication),
            "purchase" => Ok(Category::Purchase),
            "delivery" => Ok(Category::Delivery),
            "invoice" => Ok(Category::Invoice),
            "communication" => Ok(Category::Communication),
            "other" => Ok(Category::Other),
            other => Err(MailroomError::UnknownCategory(other.to_string())),
        }
    }
}

/// Derived, ephemeral feature representation of an email. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Categories whose keyword lists matched the email text
    pub matched_categories: BTreeSet<Category>,

    /// 1.0 if any urgency keyword is present, else 0.0
    pub urgency_score: f64,

    /// min(text length / 1000, 1.0)
    pub length_score: f64,
}

impl FeatureVector {
    /// An empty vector: no matches, no urgency, zero length
    pub fn empty() -> Self {
        Self {
            matched_categories: BTreeSet::new(),
            urgency_score: 0.0,
            length_score: 0.0,
        }
    }
}

/// A user correction. Append-only and immutable: created once by
/// `record_feedback`, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub email_id: EmailId,
    pub original_category: Category,
    pub correct_category: Category,

    /// User-reported confidence in the correction, in [0, 1]
    pub user_confidence: f64,

    /// Whether the original prediction matched the correction
    pub is_correct: bool,

    pub created_at: DateTime<Utc>,
}

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Scored by the active trained model
    Model,

    /// Returned by the external inference provider
    Provider,

    /// Fixed default after a provider failure
    ProviderDefault,
}

/// Result of classifying an email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,

    /// Normalized confidence in [0, 1]
    pub confidence: f64,

    /// Free-text reasoning, present for provider-backed classifications
    pub reasoning: Option<String>,

    pub source: ClassificationSource,
}

/// Per-category slice of a weight table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    /// Prior probability of the category; priors across the table sum to 1
    pub prior: f64,

    /// Smoothed likelihood per keyword feature
    pub likelihoods: BTreeMap<String, f64>,
}

/// Trained Naive-Bayes weight table: one entry per observed category.
/// BTreeMap-backed so iteration order (and therefore scoring) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub categories: BTreeMap<Category, CategoryWeights>,
}

impl WeightTable {
    /// True when no categories have been trained
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Prior for a category, if it was observed at training time
    pub fn prior(&self, category: Category) -> Option<f64> {
        self.categories.get(&category).map(|w| w.prior)
    }

    /// Likelihood of a keyword feature given a category, if observed
    pub fn likelihood(&self, category: Category, keyword: &str) -> Option<f64> {
        self.categories
            .get(&category)
            .and_then(|w| w.likelihoods.get(keyword).copied())
    }
}

/// Quality metrics for a trained model, computed by re-predicting the
/// training set (in-sample; no held-out split exists in this system).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision_by_category: BTreeMap<Category, f64>,
    pub recall_by_category: BTreeMap<Category, f64>,
    pub f1_by_category: BTreeMap<Category, f64>,
    pub total_samples: usize,
}

/// Model kind. The only trained kind today is Naive Bayes; provider-backed
/// classification does not produce a model row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    NaiveBayes,
}

/// A trained model. Created only by a successful training run; once
/// superseded it is retained read-only for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub model_type: ModelType,
    pub weights: WeightTable,
    pub metrics: ModelMetrics,
    pub trained_at: DateTime<Utc>,
    pub active: bool,
}

/// One labeled sample for the trainer: a user-corrected category joined
/// with the original email's feature vector.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub category: Category,
    pub features: FeatureVector,
}

/// Filter for listing correction history
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub email_id: Option<EmailId>,
    pub correct_category: Option<Category>,

    /// Only corrections where the original prediction was wrong
    pub only_incorrect: bool,

    pub since: Option<DateTime<Utc>>,
}

impl FeedbackFilter {
    /// Whether a feedback row passes this filter
    pub fn matches(&self, feedback: &Feedback) -> bool {
        if let Some(email_id) = self.email_id {
            if feedback.email_id != email_id {
                return false;
            }
        }
        if let Some(category) = self.correct_category {
            if feedback.correct_category != category {
                return false;
            }
        }
        if self.only_incorrect && feedback.is_correct {
            return false;
        }
        if let Some(since) = self.since {
            if feedback.created_at < since {
                return false;
            }
        }
        true
    }
}
