//! Configuration for the Mailroom engine.
//!
//! The inference-provider settings follow the same shape as the rest of the
//! platform's LLM integrations: API key from the environment by default,
//! with model, token, temperature and timeout knobs.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for the external inference provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Anthropic API key
    pub api_key: String,

    /// Model to use
    pub model: String,

    /// Max tokens for responses
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,

    /// Hard timeout for a single provider call, in seconds. The fallback
    /// classifier degrades to the fixed default when this elapses.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            timeout_secs: 15,
        }
    }
}

/// Top-level configuration for a [`crate::service::TriageService`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    pub llm: LlmConfig,
}
