//! Vendor adapters: one prompt in, raw reply text out.
//!
//! A [`ChatBackend`] wraps exactly one vendor API call and owns the
//! [`ModelRoster`] used for model fallback.  Adapters never classify their
//! own failures — they surface a [`ProviderError`] whose message carries the
//! vendor's wording, and the [`RetryEngine`](crate::llm::RetryEngine) decides
//! what to do with it.

pub mod claude;
pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use claude::ClaudeBackend;
pub use gemini::GeminiBackend;

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// A single failed vendor call.
///
/// The `Display` text is what the retry engine pattern-matches on, so
/// variants keep the vendor's own error body verbatim.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport or connection failure.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request exceeded the client timeout.
    #[error("request timed out")]
    Timeout,

    /// The vendor answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The reply could not be decoded.
    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: String, message: String },

    /// The reply decoded but carried no text.  `reason` keeps the vendor's
    /// own explanation (finish/stop reason, block reason, safety ratings).
    #[error("Empty response from {provider} API{}", reason_suffix(.reason))]
    EmptyResponse {
        provider: String,
        reason: Option<String>,
    },

    /// A model client could not be built for the given model name.
    #[error("failed to initialize model {model}: {reason}")]
    ModelInit { model: String, reason: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            // The Gemini key travels in the query string; keep it out of messages.
            ProviderError::Request(e.without_url().to_string())
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(" ({r})")).unwrap_or_default()
}

/// Read a non-success response into [`ProviderError::Api`].
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Api { status, body }
}

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// Object-safe interface over one vendor's text-generation API.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable vendor name used in logs and user-facing errors.
    fn provider_name(&self) -> &'static str;

    /// Model the next call will use.
    fn current_model(&self) -> &str;

    /// Position of the current model in the fallback list.
    fn model_index(&self) -> usize;

    /// Send `prompt` to the current model and return the reply text.
    async fn send_prompt(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Advance to the next fallback model.  Returns `false` once the list is
    /// exhausted; never moves backwards.
    fn switch_to_next_model(&mut self) -> bool;
}

// Compile-time assertion: Box<dyn ChatBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ChatBackend>) {}
};

// ---------------------------------------------------------------------------
// ModelRoster
// ---------------------------------------------------------------------------

/// Ordered fallback list plus a forward-only cursor.
///
/// Seeded with the configured model first, followed by the remaining vendor
/// defaults.  An unrecognised configured model is dropped in favour of the
/// vendor's default ordering.
#[derive(Debug, Clone)]
pub struct ModelRoster {
    models: Vec<String>,
    index: usize,
}

impl ModelRoster {
    pub fn new(configured: &str, defaults: &[&str], provider: &str) -> Self {
        let models: Vec<String> = if defaults.contains(&configured) {
            log::info!("Using primary model from config: {configured}");
            std::iter::once(configured)
                .chain(defaults.iter().copied().filter(|m| *m != configured))
                .map(str::to_string)
                .collect()
        } else {
            log::warn!(
                "{provider} model '{configured}' not in available models, using fallback: {}",
                defaults.first().copied().unwrap_or_default()
            );
            defaults.iter().map(|m| m.to_string()).collect()
        };
        Self { models, index: 0 }
    }

    /// Use `models` verbatim, in order.  Returns `None` for an empty list.
    pub fn from_models(models: Vec<String>) -> Option<Self> {
        if models.is_empty() {
            None
        } else {
            Some(Self { models, index: 0 })
        }
    }

    pub fn current(&self) -> &str {
        &self.models[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Move to the next model, returning it, or `None` when at the end.
    pub fn advance(&mut self) -> Option<&str> {
        if self.index + 1 < self.models.len() {
            self.index += 1;
            Some(&self.models[self.index])
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &[&str] = &["alpha", "beta", "gamma"];

    #[test]
    fn empty_response_carries_vendor_reason() {
        let bare = ProviderError::EmptyResponse {
            provider: "Gemini".into(),
            reason: None,
        };
        assert_eq!(bare.to_string(), "Empty response from Gemini API");

        let blocked = ProviderError::EmptyResponse {
            provider: "Gemini".into(),
            reason: Some("finishReason: SAFETY".into()),
        };
        assert_eq!(
            blocked.to_string(),
            "Empty response from Gemini API (finishReason: SAFETY)"
        );
    }

    #[test]
    fn configured_model_goes_first() {
        let roster = ModelRoster::new("beta", DEFAULTS, "Test");
        assert_eq!(roster.models(), ["beta", "alpha", "gamma"]);
        assert_eq!(roster.current(), "beta");
        assert_eq!(roster.index(), 0);
    }

    #[test]
    fn unknown_model_uses_default_order() {
        let roster = ModelRoster::new("omega", DEFAULTS, "Test");
        assert_eq!(roster.models(), ["alpha", "beta", "gamma"]);
        assert_eq!(roster.current(), "alpha");
    }

    #[test]
    fn advance_is_forward_only_and_stops_at_end() {
        let mut roster = ModelRoster::new("alpha", DEFAULTS, "Test");
        let mut seen = Vec::new();
        for _ in 0..5 {
            let before = roster.index();
            seen.push(roster.advance().is_some());
            assert!(roster.index() >= before);
        }
        assert_eq!(seen, [true, true, false, false, false]);
        assert_eq!(roster.current(), "gamma");
    }

    #[test]
    fn empty_custom_list_is_rejected() {
        assert!(ModelRoster::from_models(Vec::new()).is_none());
        let roster = ModelRoster::from_models(vec!["x".into()]).unwrap();
        assert_eq!(roster.current(), "x");
    }

    #[test]
    fn provider_error_text_keeps_vendor_wording() {
        let err = ProviderError::Api {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "{\"error\":\"invalid x-api-key\"}".into(),
        };
        let text = err.to_string();
        assert!(text.contains("401 Unauthorized"));
        assert!(text.contains("invalid x-api-key"));
        assert_eq!(ProviderError::Timeout.to_string(), "request timed out");
    }
}
