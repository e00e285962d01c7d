//! Provider construction.
//!
//! [`ProviderSettings`] is the validated, explicitly constructed input for
//! one provider (credential, model, sampling and retry settings).
//! [`ProviderFactory`] holds the pieces shared by every provider it builds
//! (prompt store, audit sink, sleeper) and turns settings into a
//! `Box<dyn AiProvider>`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ProviderKind};
use crate::llm::audit::{AuditSink, NullAuditSink};
use crate::llm::backend::{ClaudeBackend, GeminiBackend, ProviderError};
use crate::llm::error::AiError;
use crate::llm::prompt::{PromptStore, CLOSING_COMMENT, WORK_TRIAGING};
use crate::llm::provider::{AiProvider, TriageProvider};
use crate::llm::response::ResponseProcessor;
use crate::llm::retry::{RetryEngine, RetryPolicy, Sleeper, TokioSleeper};

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// ProviderSettings
// ---------------------------------------------------------------------------

/// Everything needed to build one provider.  Validated on construction.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    /// Sampling temperature, 0.0 – 1.0.
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Override of the vendor API root (tests, proxies).
    pub base_url: Option<String>,
    pub retry: RetryPolicy,
}

impl ProviderSettings {
    /// Settings with default sampling and retry values.
    ///
    /// Fails when the API key is blank.
    pub fn new(kind: ProviderKind, api_key: &str, model: &str) -> Result<Self, AiError> {
        let api_key: String = api_key.chars().filter(|c| !c.is_whitespace()).collect();
        if api_key.is_empty() {
            log::error!("{} not configured for provider '{kind}'", kind.api_key_env());
            return Err(AiError::Config(format!(
                "{} not found in environment variables",
                kind.api_key_env()
            )));
        }

        Ok(Self {
            kind,
            api_key,
            model: model.trim().to_string(),
            temperature: 0.0,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            base_url: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Settings for the provider selected in `config`, using `api_key`.
    pub fn from_config(config: &AppConfig, api_key: &str) -> Result<Self, AiError> {
        let retry_delay = Duration::try_from_secs_f64(config.retry.base_delay_secs)
            .map_err(|e| AiError::Config(format!("invalid base_delay_secs: {e}")))?;

        let settings = Self::new(config.ai.provider, api_key, &config.ai.model)?
            .with_temperature(config.ai.temperature)?
            .with_retry(RetryPolicy::new(config.retry.max_retries, retry_delay))?
            .with_timeout(Duration::from_secs(config.ai.timeout_secs))?
            .with_max_output_tokens(config.ai.max_output_tokens)
            .with_base_url(config.ai.base_url.clone());
        Ok(settings)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, AiError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(AiError::Config(format!(
                "Invalid temperature: {temperature}. Must be between 0.0 and 1.0"
            )));
        }
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Result<Self, AiError> {
        if retry.max_retries == 0 {
            return Err(AiError::Config("max_retries must be at least 1".into()));
        }
        self.retry = retry;
        Ok(self)
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AiError> {
        if timeout.is_zero() {
            return Err(AiError::Config("timeout_secs must be at least 1".into()));
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }
}

// ---------------------------------------------------------------------------
// ProviderFactory
// ---------------------------------------------------------------------------

/// Builds providers that share one prompt store, audit sink and sleeper.
#[derive(Clone)]
pub struct ProviderFactory {
    prompts: Arc<PromptStore>,
    audit: Arc<dyn AuditSink>,
    sleeper: Arc<dyn Sleeper>,
}

impl ProviderFactory {
    pub fn new(prompts: PromptStore, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            prompts: Arc::new(prompts),
            audit,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the backoff sleeper (tests).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Build the provider named by `settings.kind`.
    pub fn build(&self, settings: &ProviderSettings) -> Result<Box<dyn AiProvider>, AiError> {
        for id in [WORK_TRIAGING, CLOSING_COMMENT] {
            if !self.prompts.contains(id) {
                return Err(AiError::Config(format!("prompt template '{id}' is missing")));
            }
        }

        let engine = RetryEngine::with_sleeper(settings.retry, self.sleeper.clone());
        let processor = ResponseProcessor::new(self.audit.clone());
        let init_err = |e: ProviderError| {
            log::error!("Failed to initialize {} client: {e}", settings.kind);
            AiError::Config(format!("failed to initialize {} provider: {e}", settings.kind))
        };

        let provider: Box<dyn AiProvider> = match settings.kind {
            ProviderKind::Claude => Box::new(TriageProvider::new(
                ClaudeBackend::from_settings(settings).map_err(init_err)?,
                self.prompts.clone(),
                engine,
                processor,
            )),
            ProviderKind::Gemini => Box::new(TriageProvider::new(
                GeminiBackend::from_settings(settings).map_err(init_err)?,
                self.prompts.clone(),
                engine,
                processor,
            )),
        };

        log::info!(
            "{} provider ready (model: {}, temperature: {}, max retries: {})",
            provider.provider_name(),
            provider.current_model(),
            settings.temperature,
            settings.retry.max_retries
        );
        Ok(provider)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new(PromptStore::builtin(), Arc::new(NullAuditSink))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
