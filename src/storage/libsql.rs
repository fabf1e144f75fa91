//! libsql-backed repository.
//!
//! Persists emails, the append-only feedback log, and the model arena in a
//! local SQLite database. Schema creation is idempotent (`IF NOT EXISTS`),
//! safe to call on every startup.

use crate::error::{MailroomError, Result};
use crate::storage::Repository;
use crate::types::{
    Category, Email, EmailId, Feedback, FeedbackFilter, Model, ModelId, ModelMetrics, ModelType,
    WeightTable,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

/// Repository backed by a local libsql database.
///
/// The database is opened once at construction; every call draws a
/// connection from that long-lived handle.
#[derive(Debug)]
pub struct LibsqlRepository {
    db: libsql::Database,
}

impl LibsqlRepository {
    /// Open (or create) the database at the given path
    pub async fn new(db_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = libsql::Builder::new_local(db_path.as_ref())
            .build()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Get a connection from the open database
    fn conn(&self) -> Result<libsql::Connection> {
        self.db
            .connect()
            .map_err(|e| MailroomError::Database(format!("Failed to get connection: {}", e)))
    }

    /// Initialize database tables
    pub async fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                body TEXT,
                preview TEXT,
                received_at INTEGER NOT NULL,
                predicted_category TEXT,
                predicted_confidence REAL
            )
            "#,
            libsql::params![],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to create emails table: {}", e)))?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL,
                original_category TEXT NOT NULL,
                correct_category TEXT NOT NULL,
                user_confidence REAL NOT NULL,
                is_correct INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            libsql::params![],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to create feedback table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_feedback_email ON feedback(email_id)",
            libsql::params![],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to create index: {}", e)))?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                id TEXT PRIMARY KEY,
                model_type TEXT NOT NULL,
                weights TEXT NOT NULL,
                metrics TEXT NOT NULL,
                trained_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0
            )
            "#,
            libsql::params![],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to create models table: {}", e)))?;

        info!("Mailroom database schema initialized");
        Ok(())
    }

    fn decode_email(row: &libsql::Row) -> Result<Email> {
        let id: String = row
            .get(0)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let subject: String = row
            .get(1)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let sender: String = row
            .get(2)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let body: Option<String> = row
            .get(3)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let preview: Option<String> = row
            .get(4)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let received_at: i64 = row
            .get(5)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let predicted_category: Option<String> = row
            .get(6)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let predicted_confidence: Option<f64> = row
            .get(7)
            .map_err(|e| MailroomError::Database(e.to_string()))?;

        let predicted_category = predicted_category
            .map(|s| Category::from_str(&s))
            .transpose()?;

        Ok(Email {
            id: EmailId::from_string(&id)?,
            subject,
            sender,
            body,
            preview,
            received_at: timestamp(received_at)?,
            predicted_category,
            predicted_confidence,
        })
    }

    fn decode_feedback(row: &libsql::Row) -> Result<Feedback> {
        let id: String = row
            .get(0)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let email_id: String = row
            .get(1)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let original_category: String = row
            .get(2)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let correct_category: String = row
            .get(3)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let user_confidence: f64 = row
            .get(4)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let is_correct: i64 = row
            .get(5)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let created_at: i64 = row
            .get(6)
            .map_err(|e| MailroomError::Database(e.to_string()))?;

        Ok(Feedback {
            id: Uuid::parse_str(&id)?,
            email_id: EmailId::from_string(&email_id)?,
            original_category: Category::from_str(&original_category)?,
            correct_category: Category::from_str(&correct_category)?,
            user_confidence,
            is_correct: is_correct != 0,
            created_at: timestamp(created_at)?,
        })
    }

    fn decode_model(row: &libsql::Row) -> Result<Model> {
        let id: String = row
            .get(0)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let model_type: String = row
            .get(1)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let weights_json: String = row
            .get(2)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let metrics_json: String = row
            .get(3)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let trained_at: i64 = row
            .get(4)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        let active: i64 = row
            .get(5)
            .map_err(|e| MailroomError::Database(e.to_string()))?;

        let model_type = match model_type.as_str() {
            "naive_bayes" => ModelType::NaiveBayes,
            other => {
                return Err(MailroomError::Database(format!(
                    "Unknown model type: {}",
                    other
                )))
            }
        };

        let weights: WeightTable = serde_json::from_str(&weights_json)?;
        let metrics: ModelMetrics = serde_json::from_str(&metrics_json)?;

        Ok(Model {
            id: ModelId(Uuid::parse_str(&id)?),
            model_type,
            weights,
            metrics,
            trained_at: timestamp(trained_at)?,
            active: active != 0,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| MailroomError::Database(format!("Invalid timestamp: {}", secs)))
}

#[async_trait]
impl Repository for LibsqlRepository {
    async fn insert_email(&self, email: &Email) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO emails (
                id, subject, sender, body, preview, received_at,
                predicted_category, predicted_confidence
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                email.id.to_string(),
                email.subject.clone(),
                email.sender.clone(),
                email.body.clone(),
                email.preview.clone(),
                email.received_at.timestamp(),
                email.predicted_category.map(|c| c.as_str().to_string()),
                email.predicted_confidence,
            ],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to insert email: {}", e)))?;
        Ok(())
    }

    async fn get_email(&self, id: EmailId) -> Result<Email> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, subject, sender, body, preview, received_at, \
                 predicted_category, predicted_confidence FROM emails WHERE id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to query email: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
        {
            Some(row) => Self::decode_email(&row),
            None => Err(MailroomError::EmailNotFound(id.to_string())),
        }
    }

    async fn set_prediction(
        &self,
        id: EmailId,
        category: Category,
        confidence: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE emails SET predicted_category = ?, predicted_confidence = ? WHERE id = ?",
                libsql::params![
                    category.as_str().to_string(),
                    confidence,
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to update prediction: {}", e)))?;

        if changed == 0 {
            return Err(MailroomError::EmailNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO feedback (
                id, email_id, original_category, correct_category,
                user_confidence, is_correct, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                feedback.id.to_string(),
                feedback.email_id.to_string(),
                feedback.original_category.as_str().to_string(),
                feedback.correct_category.as_str().to_string(),
                feedback.user_confidence,
                feedback.is_correct as i64,
                feedback.created_at.timestamp(),
            ],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to insert feedback: {}", e)))?;
        Ok(())
    }

    async fn list_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<Feedback>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, email_id, original_category, correct_category, \
                 user_confidence, is_correct, created_at FROM feedback ORDER BY created_at",
                libsql::params![],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to query feedback: {}", e)))?;

        // Filter in-process; the feedback log stays small relative to the
        // email table and the filter shape varies per caller.
        let mut feedback = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
        {
            let decoded = Self::decode_feedback(&row)?;
            if filter.matches(&decoded) {
                feedback.push(decoded);
            }
        }
        Ok(feedback)
    }

    async fn count_feedback(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM feedback", libsql::params![])
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to count feedback: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
            .ok_or_else(|| MailroomError::Database("Empty COUNT result".to_string()))?;

        let count: i64 = row
            .get(0)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        Ok(count as usize)
    }

    async fn insert_model(&self, model: &Model) -> Result<()> {
        let conn = self.conn()?;
        let weights_json = serde_json::to_string(&model.weights)?;
        let metrics_json = serde_json::to_string(&model.metrics)?;

        conn.execute(
            r#"
            INSERT INTO models (id, model_type, weights, metrics, trained_at, active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                model.id.to_string(),
                "naive_bayes",
                weights_json,
                metrics_json,
                model.trained_at.timestamp(),
                model.active as i64,
            ],
        )
        .await
        .map_err(|e| MailroomError::Database(format!("Failed to insert model: {}", e)))?;
        Ok(())
    }

    async fn activate_model(&self, id: ModelId) -> Result<()> {
        let conn = self.conn()?;

        // Verify the target exists before touching any row, so a bad ID
        // cannot leave the table with zero active models.
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM models WHERE id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to verify model: {}", e)))?;
        let row = rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
            .ok_or_else(|| MailroomError::Database("Empty COUNT result".to_string()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| MailroomError::Database(e.to_string()))?;
        if count != 1 {
            return Err(MailroomError::ModelPersistence(format!(
                "No such model: {}",
                id
            )));
        }

        // One UPDATE flips every row, so the swap cannot be observed
        // half-done: the new model becomes active and all others inactive
        // in the same statement.
        conn.execute(
            "UPDATE models SET active = CASE WHEN id = ? THEN 1 ELSE 0 END",
            libsql::params![id.to_string()],
        )
        .await
        .map_err(|e| MailroomError::ModelPersistence(format!("Failed to activate model: {}", e)))?;
        Ok(())
    }

    async fn get_active_model(&self) -> Result<Option<Model>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, model_type, weights, metrics, trained_at, active \
                 FROM models WHERE active = 1 LIMIT 1",
                libsql::params![],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to query model: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
        {
            Some(row) => Ok(Some(Self::decode_model(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, model_type, weights, metrics, trained_at, active \
                 FROM models ORDER BY trained_at",
                libsql::params![],
            )
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to query models: {}", e)))?;

        let mut models = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MailroomError::Database(format!("Failed to read row: {}", e)))?
        {
            models.push(Self::decode_model(&row)?);
        }
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn repo() -> (TempDir, LibsqlRepository) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("mailroom_test.db");
        let repo = LibsqlRepository::new(&db_path).await.unwrap();
        repo.init_schema().await.unwrap();
        (temp_dir, repo)
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (_guard, repo) = repo().await;
        repo.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_fails_for_unreachable_path() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("missing").join("mailroom.db");

        // The database is opened at construction, so a bad path surfaces
        // here rather than on the first query.
        let err = LibsqlRepository::new(&db_path).await.unwrap_err();
        assert!(matches!(err, MailroomError::Database(_)));
    }

    #[tokio::test]
    async fn test_email_roundtrip() {
        let (_guard, repo) = repo().await;

        let email = Email::new(
            "Delivery note",
            "haulage@example.com",
            Some("shipment arriving Monday".to_string()),
        );
        repo.insert_email(&email).await.unwrap();

        let stored = repo.get_email(email.id).await.unwrap();
        assert_eq!(stored.subject, email.subject);
        assert_eq!(stored.sender, email.sender);
        assert_eq!(stored.body, email.body);
        assert_eq!(stored.predicted_category, None);

        repo.set_prediction(email.id, Category::Delivery, 0.81)
            .await
            .unwrap();
        let stored = repo.get_email(email.id).await.unwrap();
        assert_eq!(stored.predicted_category, Some(Category::Delivery));
    }

    #[tokio::test]
    async fn test_prediction_for_missing_email_errors() {
        let (_guard, repo) = repo().await;
        let err = repo
            .set_prediction(EmailId::new(), Category::Order, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::EmailNotFound(_)));
    }

    #[tokio::test]
    async fn test_feedback_append_and_filter() {
        let (_guard, repo) = repo().await;
        let email_id = EmailId::new();

        for i in 0..4 {
            let feedback = Feedback {
                id: Uuid::new_v4(),
                email_id,
                original_category: Category::Other,
                correct_category: if i % 2 == 0 {
                    Category::Invoice
                } else {
                    Category::Order
                },
                user_confidence: 0.9,
                is_correct: false,
                created_at: Utc::now(),
            };
            repo.insert_feedback(&feedback).await.unwrap();
        }

        assert_eq!(repo.count_feedback().await.unwrap(), 4);

        let invoices = repo
            .list_feedback(&FeedbackFilter {
                correct_category: Some(Category::Invoice),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(invoices.len(), 2);
    }

    #[tokio::test]
    async fn test_model_persistence_and_activation_swap() {
        let (_guard, repo) = repo().await;

        let zeros: std::collections::BTreeMap<Category, f64> =
            Category::ALL.iter().map(|&c| (c, 0.0)).collect();
        let make_model = || Model {
            id: ModelId::new(),
            model_type: ModelType::NaiveBayes,
            weights: WeightTable::default(),
            metrics: ModelMetrics {
                accuracy: 0.92,
                precision_by_category: zeros.clone(),
                recall_by_category: zeros.clone(),
                f1_by_category: zeros.clone(),
                total_samples: 60,
            },
            trained_at: Utc::now(),
            active: false,
        };

        let first = make_model();
        repo.insert_model(&first).await.unwrap();
        repo.activate_model(first.id).await.unwrap();
        assert_eq!(repo.get_active_model().await.unwrap().unwrap().id, first.id);

        let second = make_model();
        repo.insert_model(&second).await.unwrap();
        repo.activate_model(second.id).await.unwrap();

        let models = repo.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models.iter().filter(|m| m.active).count(), 1);
        assert_eq!(repo.get_active_model().await.unwrap().unwrap().id, second.id);

        let restored = repo.get_active_model().await.unwrap().unwrap();
        assert!((restored.metrics.accuracy - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_activating_unknown_model_fails() {
        let (_guard, repo) = repo().await;
        let err = repo.activate_model(ModelId::new()).await.unwrap_err();
        assert!(matches!(err, MailroomError::ModelPersistence(_)));
    }
}
