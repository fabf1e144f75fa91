//! In-process model registry.
//!
//! Holds the arena of trained models and the single "current" slot the
//! classifier reads from. Publication is a write-new-then-swap transition
//! under one write lock, so readers never observe zero or two current
//! models mid-swap. Superseded models stay in the arena for audit.
//!
//! Training mutual exclusion lives here too: a training run holds the
//! registry's training mutex for its full duration, so at most one
//! candidate model is ever in flight.

use crate::types::Model;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::info;

#[derive(Debug, Default)]
struct RegistryInner {
    models: Vec<Arc<Model>>,
    current: Option<usize>,
}

/// Arena of models with an atomically swapped current slot
#[derive(Debug, Default)]
pub struct ModelRegistry {
    inner: RwLock<RegistryInner>,
    training: Mutex<()>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model currently used for live classification, if any
    pub async fn current(&self) -> Option<Arc<Model>> {
        let inner = self.inner.read().await;
        inner.current.map(|index| Arc::clone(&inner.models[index]))
    }

    /// Publish a freshly trained model and make it current in one step.
    ///
    /// The prior model (if any) is superseded but retained.
    pub async fn publish(&self, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        let mut inner = self.inner.write().await;
        inner.models.push(Arc::clone(&model));
        let new_index = inner.models.len() - 1;
        let superseded = inner.current.replace(new_index);

        info!(
            model_id = %model.id,
            superseded = superseded.is_some(),
            arena_size = inner.models.len(),
            "Published model as current"
        );
        model
    }

    /// Seed the registry with an already-persisted model, e.g. on startup
    pub async fn restore(&self, model: Model) -> Arc<Model> {
        self.publish(model).await
    }

    /// All models ever published, oldest first
    pub async fn history(&self) -> Vec<Arc<Model>> {
        self.inner.read().await.models.clone()
    }

    /// Acquire the training lock, serializing training runs. Dropping the
    /// guard (on success, failure, or abort) releases the slot without
    /// touching the current model.
    pub async fn training_guard(&self) -> MutexGuard<'_, ()> {
        self.training.lock().await
    }
}
