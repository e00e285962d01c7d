//! Vendor API keys read from the process environment.
//!
//! The binary loads a `.env` file (via `dotenvy`) before calling
//! [`ApiKeys::from_env`], so keys can live in either place.

use crate::config::ProviderKind;
use crate::llm::AiError;

/// Sample value shipped in `.env` templates; treated as "not set".
const GEMINI_PLACEHOLDER: &str = "your_gemini_api_key_here";

/// API keys for every supported vendor.  `None` means not configured.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub claude: Option<String>,
    pub gemini: Option<String>,
}

impl ApiKeys {
    /// Read `CLAUDE_API_KEY` and `GEMINI_API_KEY` from the environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let claude = lookup(ProviderKind::Claude.api_key_env()).and_then(clean);
        let gemini = lookup(ProviderKind::Gemini.api_key_env())
            .and_then(clean)
            .filter(|key| key != GEMINI_PLACEHOLDER);

        Self { claude, gemini }
    }

    /// The key for `kind`, or a configuration error naming the missing
    /// variable.
    pub fn key_for(&self, kind: ProviderKind) -> Result<&str, AiError> {
        let key = match kind {
            ProviderKind::Claude => self.claude.as_deref(),
            ProviderKind::Gemini => self.gemini.as_deref(),
        };
        key.ok_or_else(|| {
            AiError::Config(format!("{} not found in environment variables", kind.api_key_env()))
        })
    }
}

// Keys never appear in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("claude", &self.claude.as_ref().map(|_| "<set>"))
            .field("gemini", &self.gemini.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Strip all whitespace (keys pasted with line breaks are common).
fn clean(raw: String) -> Option<String> {
    let key: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    (!key.is_empty()).then_some(key)
}
