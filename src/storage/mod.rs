//! Storage layer for the Mailroom engine.
//!
//! Provides the [`Repository`] abstraction the pipeline is written
//! against, plus an in-memory backend used in tests and by embedders that
//! bring their own persistence.

pub mod libsql;

use crate::error::{MailroomError, Result};
use crate::types::{Category, Email, EmailId, Feedback, FeedbackFilter, Model, ModelId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Repository trait defining all required operations.
///
/// The pipeline assumes no transaction semantics beyond one contract:
/// [`Repository::activate_model`] is atomic, so persisted state can never
/// show zero or two active models after a successful training run.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Store a newly ingested email
    async fn insert_email(&self, email: &Email) -> Result<()>;

    /// Retrieve an email by ID
    async fn get_email(&self, id: EmailId) -> Result<Email>;

    /// Record the latest prediction for an email
    async fn set_prediction(&self, id: EmailId, category: Category, confidence: f64)
        -> Result<()>;

    /// Append a feedback row. Always inserts; never deduplicates.
    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()>;

    /// List feedback rows matching a filter, oldest first
    async fn list_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<Feedback>>;

    /// Total number of feedback rows
    async fn count_feedback(&self) -> Result<usize>;

    /// Insert a trained model row (inactive until activated)
    async fn insert_model(&self, model: &Model) -> Result<()>;

    /// Atomically make one model active and deactivate all others
    async fn activate_model(&self, id: ModelId) -> Result<()>;

    /// The currently active model, if any
    async fn get_active_model(&self) -> Result<Option<Model>>;

    /// All persisted models, oldest first. Superseded models are retained.
    async fn list_models(&self) -> Result<Vec<Model>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    emails: HashMap<EmailId, Email>,
    feedback: Vec<Feedback>,
    models: Vec<Model>,
}

/// In-memory repository backend
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_email(&self, email: &Email) -> Result<()> {
        let mut state = self.state.write().await;
        state.emails.insert(email.id, email.clone());
        Ok(())
    }

    async fn get_email(&self, id: EmailId) -> Result<Email> {
        let state = self.state.read().await;
        state
            .emails
            .get(&id)
            .cloned()
            .ok_or_else(|| MailroomError::EmailNotFound(id.to_string()))
    }

    async fn set_prediction(
        &self,
        id: EmailId,
        category: Category,
        confidence: f64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let email = state
            .emails
            .get_mut(&id)
            .ok_or_else(|| MailroomError::EmailNotFound(id.to_string()))?;
        email.predicted_category = Some(category);
        email.predicted_confidence = Some(confidence);
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        let mut state = self.state.write().await;
        state.feedback.push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<Feedback>> {
        let state = self.state.read().await;
        Ok(state
            .feedback
            .iter()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    async fn count_feedback(&self) -> Result<usize> {
        Ok(self.state.read().await.feedback.len())
    }

    async fn insert_model(&self, model: &Model) -> Result<()> {
        let mut state = self.state.write().await;
        state.models.push(model.clone());
        Ok(())
    }

    async fn activate_model(&self, id: ModelId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.models.iter().any(|m| m.id == id) {
            return Err(MailroomError::ModelPersistence(format!(
                "No such model: {}",
                id
            )));
        }
        // Single critical section: the swap is all-or-nothing.
        for model in &mut state.models {
            model.active = model.id == id;
        }
        Ok(())
    }

    async fn get_active_model(&self) -> Result<Option<Model>> {
        let state = self.state.read().await;
        Ok(state.models.iter().find(|m| m.active).cloned())
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        Ok(self.state.read().await.models.clone())
    }
}
