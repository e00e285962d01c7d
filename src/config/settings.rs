//! `settings.toml` schema: one struct per section, defaults, validation.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Missing keys fall back
//! to their defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// Selects which LLM vendor handles classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Claude (Messages API).
    #[default]
    Claude,
    /// Google Gemini (generateContent API).
    Gemini,
}

impl ProviderKind {
    /// Environment variable holding this vendor's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "CLAUDE_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Model used when the config does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude-3-5-sonnet-20241022",
            ProviderKind::Gemini => "gemini-1.5-pro",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Claude => f.write_str("claude"),
            ProviderKind::Gemini => f.write_str("gemini"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(ProviderKind::Claude),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(format!(
                "Unsupported provider: {other}. Must be 'claude' or 'gemini'"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// AiConfig
// ---------------------------------------------------------------------------

/// Vendor, model and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Which vendor to use.
    pub provider: ProviderKind,
    /// Primary model identifier; fallbacks follow the vendor's default list.
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Upper bound on generated tokens per request.
    pub max_output_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Override of the vendor API root — `None` uses the public endpoint.
    pub base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        let provider = ProviderKind::default();
        Self {
            provider,
            model: provider.default_model().into(),
            temperature: 0.0,
            max_output_tokens: 2000,
            timeout_secs: 60,
            base_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Retry bound and backoff base for vendor calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_retries: u32,
    /// Delay after the first failure in seconds; doubles per attempt.
    pub base_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PathsConfig
// ---------------------------------------------------------------------------

/// Input/output locations for batch runs and audit files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding `inputs_only.json`.
    pub inputs_dir: PathBuf,
    /// Directory for results and the `llm_raw/` audit trail.
    pub outputs_dir: PathBuf,
    /// Prompt template override — `None` uses the built-in prompts.
    pub prompts_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inputs_dir: PathBuf::from("data/inputs"),
            outputs_dir: PathBuf::from("data/outputs"),
            prompts_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingConfig
// ---------------------------------------------------------------------------

/// Batch processing switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Re-validate each batch result against its schema before recording it.
    pub validate_outputs: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            validate_outputs: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_triage::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Vendor / model settings.
    pub ai: AiConfig,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Input / output directories.
    pub paths: PathsConfig,
    /// Batch processing switches.
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Write `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges.  Collects every problem into one error.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !(0.0..=1.0).contains(&self.ai.temperature) {
            problems.push(format!(
                "Invalid temperature: {}. Must be between 0.0 and 1.0",
                self.ai.temperature
            ));
        }
        if self.ai.model.trim().is_empty() {
            problems.push("model must not be empty".to_string());
        }
        if self.ai.timeout_secs == 0 {
            problems.push("timeout_secs must be at least 1".to_string());
        }
        if self.retry.max_retries == 0 {
            problems.push("max_retries must be at least 1".to_string());
        }
        if !self.retry.base_delay_secs.is_finite() || self.retry.base_delay_secs < 0.0 {
            problems.push(format!(
                "Invalid base_delay_secs: {}. Must be a non-negative number",
                self.retry.base_delay_secs
            ));
        }
        if self.paths.outputs_dir.as_os_str().is_empty() {
            problems.push("outputs_dir must not be empty".to_string());
        }

        for problem in &problems {
            log::warn!("Configuration warning: {problem}");
        }
        if !problems.is_empty() {
            bail!("Critical configuration errors: {}", problems.join("; "));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
