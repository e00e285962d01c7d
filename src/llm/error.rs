//! Error taxonomy for the AI-provider layer.
//!
//! [`AiError`] is what callers of [`AiProvider`](crate::llm::AiProvider) see.
//! Vendor failures enter the system as
//! [`ProviderError`](crate::llm::backend::ProviderError) and are turned into an
//! `AiError` by the [`RetryEngine`](crate::llm::RetryEngine) once it decides
//! the failure is terminal.

use thiserror::Error;

use crate::llm::prompt::PromptError;

// ---------------------------------------------------------------------------
// AiError
// ---------------------------------------------------------------------------

/// Terminal failures of a classification or closing-comment operation.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing or invalid provider configuration (API key, temperature …).
    /// Raised while building a provider, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The vendor rejected the credential.
    #[error("Invalid or expired {provider} API key")]
    Authentication { provider: String },

    /// The vendor refused the prompt on policy grounds.
    #[error("Prompt violates {provider}'s content policy")]
    ContentPolicy { provider: String },

    /// The prompt does not fit into the model's context window.
    #[error("Prompt too long - reduce input text length")]
    TokenLimit,

    /// Every attempt failed with a retryable error.
    #[error("Failed to complete {operation} after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        /// Message of the final vendor error.
        last_error: String,
    },

    /// The reply did not contain anything that looks like a JSON object.
    #[error("No JSON object found in response")]
    NoJsonFound,

    /// A JSON object was found but could not be parsed.
    #[error("invalid JSON in response: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON parsed but does not match the expected output shape.
    #[error("Invalid JSON structure in response")]
    InvalidStructure,

    /// The prompt template could not be rendered.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl AiError {
    /// `true` for failures caused by what the model returned rather than by
    /// the transport or the configuration.
    pub fn is_malformed_output(&self) -> bool {
        matches!(
            self,
            AiError::NoJsonFound | AiError::InvalidJson(_) | AiError::InvalidStructure
        )
    }
}
