//! Email triage service: the facade over the classification pipeline.
//!
//! Wires the feature extractor, trained classifier, fallback classifier,
//! feedback log, retraining policy and model registry together behind the
//! operations the surrounding application calls:
//!
//! - `classify_email`: trained model first, provider fallback otherwise;
//!   never fails for a well-formed email
//! - `record_feedback`: append a correction and trigger the retraining
//!   policy on a spawned task
//! - `train_model`: rebuild, evaluate and atomically activate a model
//! - `model_metrics` / `correction_history`: read-only views

use crate::classifier::{Classifier, ScoreOutcome};
use crate::config::TriageConfig;
use crate::error::{MailroomError, Result};
use crate::fallback::{InferenceProvider, LlmFallbackClassifier};
use crate::features::FeatureExtractor;
use crate::metrics::MetricsEvaluator;
use crate::policy::RetrainingPolicy;
use crate::registry::ModelRegistry;
use crate::storage::Repository;
use crate::trainer::NaiveBayesTrainer;
use crate::types::{
    Category, Classification, Email, EmailId, Feedback, FeedbackFilter, Model, ModelId,
    ModelMetrics, ModelType, TrainingSample,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Adaptive email-classification service
#[derive(Clone)]
pub struct TriageService {
    repo: Arc<dyn Repository>,
    registry: Arc<ModelRegistry>,
    fallback: Arc<LlmFallbackClassifier>,
    extractor: FeatureExtractor,
    classifier: Classifier,
    trainer: NaiveBayesTrainer,
    evaluator: MetricsEvaluator,
    policy: RetrainingPolicy,
}

impl TriageService {
    /// Create a service over an injected repository and inference provider
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn InferenceProvider>,
        config: TriageConfig,
    ) -> Self {
        let fallback = Arc::new(LlmFallbackClassifier::new(
            provider,
            Duration::from_secs(config.llm.timeout_secs),
        ));

        Self {
            repo,
            registry: Arc::new(ModelRegistry::new()),
            fallback,
            extractor: FeatureExtractor::new(),
            classifier: Classifier::new(),
            trainer: NaiveBayesTrainer::new(),
            evaluator: MetricsEvaluator::new(),
            policy: RetrainingPolicy::new(),
        }
    }

    /// Seed the in-process registry from the persisted active model, if
    /// one exists. Call once on startup.
    pub async fn load_active_model(&self) -> Result<()> {
        if let Some(model) = self.repo.get_active_model().await? {
            info!(model_id = %model.id, "Restored active model");
            self.registry.restore(model).await;
        }
        Ok(())
    }

    /// Store a newly ingested email
    pub async fn ingest(&self, email: Email) -> Result<Email> {
        self.repo.insert_email(&email).await?;
        Ok(email)
    }

    /// Classify an email and record the prediction.
    ///
    /// Scores against the active model when one exists; otherwise, or on
    /// any scoring anomaly, falls through to the provider-backed fallback.
    /// Only repository write failures surface as errors.
    pub async fn classify_email(&self, email: &Email) -> Result<Classification> {
        let features = self.extractor.extract(email);

        let classification = match self.registry.current().await {
            Some(model) => match self.classifier.score(&features, &model.weights) {
                ScoreOutcome::Classified(classification) => classification,
                ScoreOutcome::NoModelAvailable => self.fallback.classify(email).await,
            },
            None => self.fallback.classify(email).await,
        };

        self.repo
            .set_prediction(email.id, classification.category, classification.confidence)
            .await?;

        Ok(classification)
    }

    /// Append a user correction to the feedback log.
    ///
    /// The original category is the email's stored prediction (`other` if
    /// it was never classified). Always inserts a new row, then evaluates
    /// the retraining policy on a spawned task so the caller never waits
    /// on training.
    pub async fn record_feedback(
        &self,
        email_id: EmailId,
        correct_category: Category,
        user_confidence: f64,
    ) -> Result<Feedback> {
        if !(0.0..=1.0).contains(&user_confidence) {
            return Err(MailroomError::InvalidConfidence(user_confidence));
        }

        let email = self.repo.get_email(email_id).await?;
        let original_category = email.predicted_category.unwrap_or(Category::Other);

        let feedback = Feedback {
            id: Uuid::new_v4(),
            email_id,
            original_category,
            correct_category,
            user_confidence,
            is_correct: original_category == correct_category,
            created_at: Utc::now(),
        };
        self.repo.insert_feedback(&feedback).await?;

        info!(
            %email_id,
            original = %original_category,
            correct = %correct_category,
            is_correct = feedback.is_correct,
            "Recorded feedback"
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.maybe_retrain().await;
        });

        Ok(feedback)
    }

    /// Evaluate the retraining policy and train if it fires. Training
    /// failures are logged, never raised: insufficient data is a no-op and
    /// the active model stays as it was.
    async fn maybe_retrain(&self) {
        let current = self.registry.current().await;
        if !self.policy.should_retrain(current.as_deref()) {
            return;
        }

        match self.train_model().await {
            Ok(metrics) => {
                info!(accuracy = metrics.accuracy, "Retraining succeeded");
            }
            Err(MailroomError::InsufficientData { got, need }) => {
                info!(got, need, "Skipping retraining: not enough feedback");
            }
            Err(e) => {
                warn!(error = %e, "Retraining failed; keeping current model");
            }
        }
    }

    /// Train a new model from the full feedback log and activate it.
    ///
    /// Runs are serialized: a second caller waits for the first to finish.
    /// On any failure the previously active model is left untouched.
    pub async fn train_model(&self) -> Result<ModelMetrics> {
        let _guard = self.registry.training_guard().await;

        let samples = self.build_training_set().await?;
        let weights = self.trainer.train(&samples)?;
        let metrics = self.evaluator.evaluate(&weights, &samples);

        let mut model = Model {
            id: ModelId::new(),
            model_type: ModelType::NaiveBayes,
            weights,
            metrics: metrics.clone(),
            trained_at: Utc::now(),
            active: false,
        };

        // Write-new-then-swap: the candidate row lands inactive, then one
        // atomic activation supersedes the prior model. A failure in either
        // step leaves the old model active.
        self.repo
            .insert_model(&model)
            .await
            .map_err(into_persistence_error)?;
        self.repo
            .activate_model(model.id)
            .await
            .map_err(into_persistence_error)?;

        model.active = true;
        let published = self.registry.publish(model).await;

        info!(
            model_id = %published.id,
            accuracy = metrics.accuracy,
            samples = metrics.total_samples,
            "Activated new model"
        );
        Ok(metrics)
    }

    /// Metrics of the active model, if one exists. Stable between
    /// training runs.
    pub async fn model_metrics(&self) -> Option<ModelMetrics> {
        self.registry
            .current()
            .await
            .map(|model| model.metrics.clone())
    }

    /// List recorded corrections, oldest first
    pub async fn correction_history(&self, filter: &FeedbackFilter) -> Result<Vec<Feedback>> {
        self.repo.list_feedback(filter).await
    }

    /// Join every feedback row with its email's feature vector
    async fn build_training_set(&self) -> Result<Vec<TrainingSample>> {
        let feedback = self.repo.list_feedback(&FeedbackFilter::default()).await?;

        let mut samples = Vec::with_capacity(feedback.len());
        for row in feedback {
            let email = self.repo.get_email(row.email_id).await?;
            samples.push(TrainingSample {
                category: row.correct_category,
                features: self.extractor.extract(&email),
            });
        }
        Ok(samples)
    }
}

fn into_persistence_error(e: MailroomError) -> MailroomError {
    match e {
        MailroomError::ModelPersistence(_) => e,
        other => MailroomError::ModelPersistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{MockInferenceProvider, ProviderClassification};
    use crate::storage::MemoryRepository;
    use crate::types::ClassificationSource;

    fn provider_stub() -> Arc<dyn InferenceProvider> {
        let mut provider = MockInferenceProvider::new();
        provider.expect_classify().returning(|_| {
            Ok(ProviderClassification {
                category: Category::Communication,
                confidence: 0.7,
                reasoning: "general correspondence".to_string(),
            })
        });
        Arc::new(provider)
    }

    fn service() -> TriageService {
        TriageService::new(
            Arc::new(MemoryRepository::new()),
            provider_stub(),
            TriageConfig::default(),
        )
    }

    fn order_email(i: usize) -> Email {
        Email::new(
            format!("Order confirmation {}", i),
            "supplier@example.com",
            Some("purchase order for site materials".to_string()),
        )
    }

    async fn ingest_corrected_emails(service: &TriageService, count: usize) {
        for i in 0..count {
            let email = service.ingest(order_email(i)).await.unwrap();
            service
                .record_feedback(email.id, Category::Order, 1.0)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_classify_falls_back_without_model() {
        let service = service();
        let email = service.ingest(order_email(0)).await.unwrap();

        let classification = service.classify_email(&email).await.unwrap();
        assert_eq!(classification.source, ClassificationSource::Provider);
        assert_eq!(classification.category, Category::Communication);

        // Prediction is recorded on the email row
        let stored = service.repo.get_email(email.id).await.unwrap();
        assert_eq!(stored.predicted_category, Some(Category::Communication));
    }

    #[tokio::test]
    async fn test_record_feedback_is_additive() {
        let service = service();
        let email = service.ingest(order_email(0)).await.unwrap();

        for _ in 0..3 {
            service
                .record_feedback(email.id, Category::Order, 0.9)
                .await
                .unwrap();
        }

        let history = service
            .correction_history(&FeedbackFilter::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_feedback_computes_is_correct_from_stored_prediction() {
        let service = service();
        let email = service.ingest(order_email(0)).await.unwrap();
        service.classify_email(&email).await.unwrap();

        // Provider stub predicted Communication
        let wrong = service
            .record_feedback(email.id, Category::Order, 1.0)
            .await
            .unwrap();
        assert_eq!(wrong.original_category, Category::Communication);
        assert!(!wrong.is_correct);

        let right = service
            .record_feedback(email.id, Category::Communication, 1.0)
            .await
            .unwrap();
        assert!(right.is_correct);
    }

    #[tokio::test]
    async fn test_feedback_rejects_out_of_range_confidence() {
        let service = service();
        let email = service.ingest(order_email(0)).await.unwrap();

        let err = service
            .record_feedback(email.id, Category::Order, 1.5)
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidConfidence(c) if c == 1.5));

        let err = service
            .record_feedback(email.id, Category::Order, -0.1)
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidConfidence(_)));

        // A rejected write leaves the log empty
        let history = service
            .correction_history(&FeedbackFilter::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_train_model_insufficient_data_keeps_state() {
        let service = service();
        ingest_corrected_emails(&service, 10).await;

        let err = service.train_model().await.unwrap_err();
        assert!(matches!(err, MailroomError::InsufficientData { got: 10, .. }));
        assert!(service.registry.current().await.is_none());
        assert!(service.repo.get_active_model().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_train_model_activates_exactly_one() {
        let service = service();
        ingest_corrected_emails(&service, 60).await;

        let metrics = service.train_model().await.unwrap();
        assert_eq!(metrics.total_samples, 60);
        assert!((0.0..=1.0).contains(&metrics.accuracy));

        // Second run supersedes, never duplicates, the active flag
        service.train_model().await.unwrap();
        let models = service.repo.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models.iter().filter(|m| m.active).count(), 1);
    }

    #[tokio::test]
    async fn test_trained_model_serves_classification() {
        let service = service();
        ingest_corrected_emails(&service, 60).await;
        service.train_model().await.unwrap();

        let email = service.ingest(order_email(999)).await.unwrap();
        let classification = service.classify_email(&email).await.unwrap();
        assert_eq!(classification.source, ClassificationSource::Model);
        assert_eq!(classification.category, Category::Order);
    }

    #[tokio::test]
    async fn test_model_metrics_stable_without_retraining() {
        let service = service();
        assert!(service.model_metrics().await.is_none());

        ingest_corrected_emails(&service, 60).await;
        service.train_model().await.unwrap();

        let first = service.model_metrics().await.unwrap();
        let second = service.model_metrics().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_feedback_triggers_background_retraining() {
        let service = service();
        ingest_corrected_emails(&service, 60).await;

        // The spawned policy run should have trained a model by now
        for _ in 0..50 {
            if service.registry.current().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(service.registry.current().await.is_some());
    }

    #[tokio::test]
    async fn test_load_active_model_restores_registry() {
        let repo = Arc::new(MemoryRepository::new());
        let service = TriageService::new(repo.clone(), provider_stub(), TriageConfig::default());
        ingest_corrected_emails(&service, 60).await;
        service.train_model().await.unwrap();

        // A fresh service over the same repository picks the model up
        let restored = TriageService::new(repo, provider_stub(), TriageConfig::default());
        assert!(restored.model_metrics().await.is_none());
        restored.load_active_model().await.unwrap();
        assert!(restored.model_metrics().await.is_some());
    }
}
