//! Inference-provider-backed fallback classification.
//!
//! Used when no trained model exists or the trained model produced no
//! usable score. The provider is an injected collaborator behind
//! [`InferenceProvider`]; the production implementation calls the Anthropic
//! Messages API with a structured prompt constrained to the closed category
//! enumeration.
//!
//! Provider failures never propagate: timeouts, transport errors and
//! schema/enum violations all degrade to a fixed default classification.

use crate::config::LlmConfig;
use crate::error::{MailroomError, Result};
use crate::types::{Category, Classification, ClassificationSource, Email};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A structured classification returned by the provider, already validated
/// against the closed category enumeration.
#[derive(Debug, Clone)]
pub struct ProviderClassification {
    pub category: Category,
    pub confidence: f64,
    pub reasoning: String,
}

/// External structured-inference collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Classify an email into one of the closed categories
    async fn classify(&self, email: &Email) -> Result<ProviderClassification>;
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    text: String,
}

/// Anthropic-backed inference provider
pub struct AnthropicProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider with the given config
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(MailroomError::Config(config::ConfigError::Message(
                "ANTHROPIC_API_KEY not set".to_string(),
            )));
        }

        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Make an API call to Claude
    async fn call_api(&self, prompt: &str) -> Result<String> {
        debug!("Calling Anthropic API");

        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(MailroomError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailroomError::Provider(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| MailroomError::Provider(format!("Failed to parse response: {}", e)))?;

        api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| MailroomError::Provider("Empty response from API".to_string()))
    }

    /// Extract a field from structured LLM response
    fn extract_field(response: &str, field: &str) -> Result<String> {
        response
            .lines()
            .find(|line| line.starts_with(field))
            .and_then(|line| line.strip_prefix(field))
            .map(|s| s.trim().to_string())
            .ok_or_else(|| MailroomError::Provider(format!("Failed to extract field: {}", field)))
    }

    /// Parse and validate a structured response against the closed schema
    fn parse_response(response: &str) -> Result<ProviderClassification> {
        let category_str = Self::extract_field(response, "CATEGORY:")?;
        let confidence_str = Self::extract_field(response, "CONFIDENCE:")?;
        let reasoning = Self::extract_field(response, "REASONING:")?;

        // Enum violation is an error here; the fallback classifier turns it
        // into the default result.
        let category: Category = category_str.parse()?;

        let confidence = confidence_str
            .parse::<f64>()
            .map_err(|e| MailroomError::Provider(format!("Invalid confidence: {}", e)))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MailroomError::InvalidConfidence(confidence));
        }

        Ok(ProviderClassification {
            category,
            confidence,
            reasoning,
        })
    }
}

#[async_trait]
impl InferenceProvider for AnthropicProvider {
    async fn classify(&self, email: &Email) -> Result<ProviderClassification> {
        let categories = Category::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = format!(
            r#"You are classifying an email for a construction project management system.

Subject: {}
Sender: {}
Body: {}

Classify it into EXACTLY one of these categories: {}

Format your response EXACTLY as:
CATEGORY: <category>
CONFIDENCE: <value between 0.0 and 1.0>
REASONING: <one sentence>
"#,
            email.subject,
            email.sender,
            email.text_body(),
            categories
        );

        let response = self.call_api(&prompt).await?;
        Self::parse_response(&response)
    }
}

/// Fallback classifier wrapping an injected provider.
///
/// Never fails: any provider error, timeout, or invalid response resolves
/// to `{other, 0.5, "fallback default"}`.
pub struct LlmFallbackClassifier {
    provider: Arc<dyn InferenceProvider>,
    timeout: Duration,
}

impl LlmFallbackClassifier {
    pub fn new(provider: Arc<dyn InferenceProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// The fixed default returned whenever the provider cannot be used
    pub fn default_classification() -> Classification {
        Classification {
            category: Category::Other,
            confidence: 0.5,
            reasoning: Some("fallback default".to_string()),
            source: ClassificationSource::ProviderDefault,
        }
    }

    /// Classify via the provider, degrading to the default on any failure
    pub async fn classify(&self, email: &Email) -> Classification {
        let outcome = tokio::time::timeout(self.timeout, self.provider.classify(email)).await;

        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    email_id = %email.id,
                    category = %result.category,
                    confidence = result.confidence,
                    "Provider classified email"
                );
                Classification {
                    category: result.category,
                    confidence: result.confidence,
                    reasoning: Some(result.reasoning),
                    source: ClassificationSource::Provider,
                }
            }
            Ok(Err(e)) => {
                warn!(email_id = %email.id, error = %e, "Provider failed, using default");
                Self::default_classification()
            }
            Err(_) => {
                warn!(email_id = %email.id, "Provider timed out, using default");
                Self::default_classification()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::new(
            "Invoice 2041",
            "supplier@example.com",
            Some("payment due".to_string()),
        )
    }

    #[test]
    fn test_parse_valid_response() {
        let response = "CATEGORY: invoice\nCONFIDENCE: 0.92\nREASONING: Mentions an invoice number.";
        let parsed = AnthropicProvider::parse_response(response).unwrap();
        assert_eq!(parsed.category, Category::Invoice);
        assert!((parsed.confidence - 0.92).abs() < 1e-9);
        assert_eq!(parsed.reasoning, "Mentions an invoice number.");
    }

    #[test]
    fn test_parse_rejects_enum_violation() {
        let response = "CATEGORY: spam\nCONFIDENCE: 0.9\nREASONING: x";
        let err = AnthropicProvider::parse_response(response).unwrap_err();
        assert!(matches!(err, MailroomError::UnknownCategory(_)));
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        let response = "CATEGORY: invoice\nCONFIDENCE: 1.7\nREASONING: x";
        let err = AnthropicProvider::parse_response(response).unwrap_err();
        assert!(matches!(err, MailroomError::InvalidConfidence(_)));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let response = "CATEGORY: invoice";
        assert!(AnthropicProvider::parse_response(response).is_err());
    }

    #[tokio::test]
    async fn test_fallback_uses_provider_result() {
        let mut provider = MockInferenceProvider::new();
        provider.expect_classify().returning(|_| {
            Ok(ProviderClassification {
                category: Category::Delivery,
                confidence: 0.8,
                reasoning: "shipment details".to_string(),
            })
        });

        let fallback =
            LlmFallbackClassifier::new(Arc::new(provider), Duration::from_secs(5));
        let classification = fallback.classify(&email()).await;

        assert_eq!(classification.category, Category::Delivery);
        assert_eq!(classification.source, ClassificationSource::Provider);
    }

    #[tokio::test]
    async fn test_fallback_degrades_on_provider_error() {
        let mut provider = MockInferenceProvider::new();
        provider
            .expect_classify()
            .returning(|_| Err(MailroomError::Provider("boom".to_string())));

        let fallback =
            LlmFallbackClassifier::new(Arc::new(provider), Duration::from_secs(5));
        let classification = fallback.classify(&email()).await;

        assert_eq!(classification.category, Category::Other);
        assert!((classification.confidence - 0.5).abs() < 1e-9);
        assert_eq!(classification.reasoning.as_deref(), Some("fallback default"));
        assert_eq!(classification.source, ClassificationSource::ProviderDefault);
    }

    struct SlowProvider;

    #[async_trait]
    impl InferenceProvider for SlowProvider {
        async fn classify(&self, _email: &Email) -> Result<ProviderClassification> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(MailroomError::Provider("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fallback_degrades_on_timeout() {
        let fallback =
            LlmFallbackClassifier::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let classification = fallback.classify(&email()).await;

        assert_eq!(classification.category, Category::Other);
        assert_eq!(classification.source, ClassificationSource::ProviderDefault);
    }

    #[test]
    fn test_provider_requires_api_key() {
        let config = LlmConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(AnthropicProvider::new(config).is_err());
    }
}
