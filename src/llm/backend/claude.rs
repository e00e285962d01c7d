//! Anthropic Messages API adapter.
//!
//! One HTTP client is shared by every model; switching models only moves the
//! [`ModelRoster`] cursor.

use async_trait::async_trait;

use crate::llm::backend::{api_error, ChatBackend, ModelRoster, ProviderError};
use crate::llm::factory::ProviderSettings;

/// Default API root.
pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Fallback order when the configured model is unknown.
pub const CLAUDE_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
];

/// Calls `POST {base_url}/v1/messages`.
pub struct ClaudeBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    roster: ModelRoster,
}

impl ClaudeBackend {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let roster = ModelRoster::new(&settings.model, CLAUDE_MODELS, "Claude");
        Self::with_roster(settings, roster)
    }

    /// Build with an explicit fallback list (first entry is the primary).
    pub fn with_models(
        settings: &ProviderSettings,
        models: Vec<String>,
    ) -> Result<Self, ProviderError> {
        let roster = ModelRoster::from_models(models).ok_or_else(|| ProviderError::ModelInit {
            model: String::new(),
            reason: "fallback model list is empty".into(),
        })?;
        Self::with_roster(settings, roster)
    }

    fn with_roster(settings: &ProviderSettings, roster: ModelRoster) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build Claude client: {e}")))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| CLAUDE_BASE_URL.to_string()),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            roster,
        })
    }
}

#[async_trait]
impl ChatBackend for ClaudeBackend {
    fn provider_name(&self) -> &'static str {
        "Claude"
    }

    fn current_model(&self) -> &str {
        self.roster.current()
    }

    fn model_index(&self) -> usize {
        self.roster.index()
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model":       self.roster.current(),
            "max_tokens":  self.max_output_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let json: serde_json::Value = response.json().await.map_err(|e| ProviderError::Parse {
            provider: "Claude".into(),
            message: e.to_string(),
        })?;

        let text = json["content"][0]["text"].as_str().unwrap_or_default();

        if text.trim().is_empty() {
            let err = ProviderError::EmptyResponse {
                provider: "Claude".into(),
                reason: json["stop_reason"]
                    .as_str()
                    .map(|r| format!("stop_reason: {r}")),
            };
            log::error!("{err}");
            return Err(err);
        }

        Ok(text.to_string())
    }

    fn switch_to_next_model(&mut self) -> bool {
        let old = self.roster.current().to_string();
        match self.roster.advance() {
            Some(next) => {
                log::info!("Switching Claude from {old} to fallback model: {next}");
                true
            }
            None => {
                log::warn!("No more Claude models available for fallback");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
