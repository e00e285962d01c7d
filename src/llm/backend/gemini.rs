//! Google Gemini `generateContent` adapter.
//!
//! Gemini binds the model into the request endpoint, so every model switch
//! rebuilds a [`GenerativeModel`].  A model that cannot be built is skipped
//! and the next candidate is tried.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::llm::backend::{api_error, ChatBackend, ModelRoster, ProviderError};
use crate::llm::factory::ProviderSettings;

/// Default API root.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Fallback order when the configured model is unknown.
pub const GEMINI_MODELS: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-1.0-pro"];

// ---------------------------------------------------------------------------
// GenerativeModel
// ---------------------------------------------------------------------------

/// A model-bound request target: endpoint plus generation config.
#[derive(Debug, Clone)]
pub struct GenerativeModel {
    name: String,
    endpoint: Url,
    temperature: f32,
    max_output_tokens: u32,
}

impl GenerativeModel {
    pub fn new(
        base_url: &str,
        name: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<Self, ProviderError> {
        let init_err = |reason: String| ProviderError::ModelInit {
            model: name.to_string(),
            reason,
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        {
            return Err(init_err("invalid model name".into()));
        }

        let endpoint = Url::parse(&format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            name
        ))
        .map_err(|e| init_err(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            endpoint,
            temperature,
            max_output_tokens,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "temperature":     self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        })
    }
}

// ---------------------------------------------------------------------------
// GeminiBackend
// ---------------------------------------------------------------------------

/// Calls `POST {base_url}/models/{model}:generateContent?key=…`.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    roster: ModelRoster,
    model: GenerativeModel,
}

impl GeminiBackend {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let roster = ModelRoster::new(&settings.model, GEMINI_MODELS, "Gemini");
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
            .map_err(|e| ProviderError::Request(format!("failed to build Gemini client: {e}")))?;

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());

        let model = GenerativeModel::new(
            &base_url,
            roster.current(),
            settings.temperature,
            settings.max_output_tokens,
        )
        .inspect_err(|e| log::error!("Failed to initialize Gemini model: {e}"))?;
        log::info!("Gemini model initialized: {}", model.name());

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            roster,
            model,
        })
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn provider_name(&self) -> &'static str {
        "Gemini"
    }

    fn current_model(&self) -> &str {
        self.model.name()
    }

    fn model_index(&self) -> usize {
        self.roster.index()
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.model.endpoint.clone())
            .query(&[("key", self.api_key.as_str())])
            .json(&self.model.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let json: serde_json::Value = response.json().await.map_err(|e| ProviderError::Parse {
            provider: "Gemini".into(),
            message: e.to_string(),
        })?;

        let text: String = json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let err = ProviderError::EmptyResponse {
                provider: "Gemini".into(),
                reason: empty_reason(&json),
            };
            log::error!("{err}");
            return Err(err);
        }

        Ok(text)
    }

    fn switch_to_next_model(&mut self) -> bool {
        let mut old = self.model.name().to_string();
        while let Some(next) = self.roster.advance() {
            let next = next.to_string();
            log::info!("Switching Gemini from {old} to fallback model: {next}");
            match GenerativeModel::new(
                &self.base_url,
                &next,
                self.temperature,
                self.max_output_tokens,
            ) {
                Ok(model) => {
                    log::info!("Gemini model initialized: {next}");
                    self.model = model;
                    return true;
                }
                Err(e) => {
                    log::error!("Failed to initialize fallback model {next}: {e}");
                    old = next;
                }
            }
        }
        log::warn!("No more Gemini models available for fallback");
        false
    }
}

/// Why a 200 reply carried no text: finish reason, prompt block reason and
/// any safety ratings that were flagged, in the vendor's own words.
fn empty_reason(json: &Value) -> Option<String> {
    let candidate = &json["candidates"][0];
    let feedback = &json["promptFeedback"];
    let mut details = Vec::new();

    if let Some(reason) = candidate["finishReason"].as_str() {
        details.push(format!("finishReason: {reason}"));
    }
    if let Some(reason) = feedback["blockReason"].as_str() {
        details.push(format!("blockReason: {reason}"));
    }

    let flagged: Vec<String> = [&candidate["safetyRatings"], &feedback["safetyRatings"]]
        .into_iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter(|rating| {
            rating["blocked"].as_bool().unwrap_or(false)
                || matches!(rating["probability"].as_str(), Some("MEDIUM" | "HIGH"))
        })
        .map(|rating| {
            format!(
                "{}={}",
                rating["category"].as_str().unwrap_or("UNKNOWN"),
                rating["probability"].as_str().unwrap_or("UNKNOWN")
            )
        })
        .collect();
    if !flagged.is_empty() {
        details.push(format!("safetyRatings: {}", flagged.join(", ")));
    }

    (!details.is_empty()).then(|| details.join("; "))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
