//! Mailroom - Adaptive Email Classification Engine
//!
//! A Rust engine for triaging construction-project email that provides:
//! - Deterministic keyword/urgency/length feature extraction
//! - Supervised Naive-Bayes training driven by user corrections
//! - Confidence-scored prediction with an LLM-backed fallback
//! - An append-only feedback log and an accuracy-gated retraining policy
//! - In-sample model metrics (accuracy, per-category precision/recall/F1)
//!
//! # Architecture
//!
//! The engine is organized into several layers:
//! - **Types**: Core data structures (Email, Category, WeightTable, etc.)
//! - **Storage**: The `Repository` seam plus in-memory and libsql backends
//! - **Pipeline**: Extractor, trainer, classifier, evaluator, policy
//! - **Service**: The `TriageService` facade the application calls
//!
//! # Example
//!
//! ```ignore
//! use mailroom::{Category, Email, TriageService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = TriageService::new(repo, provider, config);
//!     service.load_active_model().await?;
//!
//!     // Classify an incoming email
//!     let email = service.ingest(Email::new(
//!         "Invoice 2041".to_string(),
//!         "supplier@example.com".to_string(),
//!         Some("payment due on receipt".to_string()),
//!     )).await?;
//!     let classification = service.classify_email(&email).await?;
//!
//!     // Record a user correction; retraining is triggered in the background
//!     service.record_feedback(email.id, Category::Invoice, 0.9).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod fallback;
pub mod features;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod service;
pub mod storage;
pub mod trainer;
pub mod types;

// Re-export commonly used types
pub use classifier::{Classifier, ScoreOutcome};
pub use config::{LlmConfig, TriageConfig};
pub use error::{MailroomError, Result};
pub use fallback::{
    AnthropicProvider, InferenceProvider, LlmFallbackClassifier, ProviderClassification,
};
pub use features::FeatureExtractor;
pub use metrics::MetricsEvaluator;
pub use policy::{RetrainingPolicy, RETRAIN_THRESHOLD};
pub use registry::ModelRegistry;
pub use service::TriageService;
pub use storage::{libsql::LibsqlRepository, MemoryRepository, Repository};
pub use trainer::{NaiveBayesTrainer, MIN_TRAINING_SAMPLES};
pub use types::{
    Category, Classification, ClassificationSource, Email, EmailId, FeatureVector, Feedback,
    FeedbackFilter, Model, ModelId, ModelMetrics, ModelType, TrainingSample, WeightTable,
};
