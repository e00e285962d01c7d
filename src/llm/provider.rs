//! Provider-level operations: classify a transcript, write a closing comment.
//!
//! [`AiProvider`] is the interface callers hold (usually as
//! `Box<dyn AiProvider>` from the [`ProviderFactory`](crate::llm::ProviderFactory)).
//! [`TriageProvider`] implements it for any [`ChatBackend`] by composing the
//! shared pieces: prompt store, retry engine and response processor.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::llm::audit::UNTRACKED_ID;
use crate::llm::backend::{ChatBackend, ClaudeBackend, GeminiBackend};
use crate::llm::error::AiError;
use crate::llm::prompt::{PromptStore, CLOSING_COMMENT, WORK_TRIAGING};
use crate::llm::response::ResponseProcessor;
use crate::llm::retry::RetryEngine;
use crate::llm::schema::{ClassificationResult, ClosingCommentResult};

/// Operation name used for classification logs and audit files.
pub const ANALYZE_WORK_INTENT: &str = "ANALYZE_WORK_INTENT";
/// Operation name used for closing-comment logs and audit files.
pub const GENERATE_CLOSING_COMMENT: &str = "GENERATE_CLOSING_COMMENT";

// ---------------------------------------------------------------------------
// AiProvider trait
// ---------------------------------------------------------------------------

/// The operations a configured provider offers to callers.
///
/// Methods take `&mut self`: a provider owns its fallback-model cursor and
/// must not be driven from two tasks at once.
#[async_trait]
pub trait AiProvider: Send {
    /// Vendor name, e.g. `"Claude"`.
    fn provider_name(&self) -> &'static str;

    /// Model the next request will use.
    fn current_model(&self) -> &str;

    /// Classify `text` into one of the four work categories.
    ///
    /// `correlation_id` only names the audit file.
    async fn classify_intent(
        &mut self,
        text: &str,
        correlation_id: Option<&str>,
    ) -> Result<ClassificationResult, AiError>;

    /// Best-effort closing comment for `text`.  Never fails: any error is
    /// logged and [`ClosingCommentResult::fallback`] is returned instead.
    async fn generate_closing_comment(
        &mut self,
        text: &str,
        correlation_id: Option<&str>,
    ) -> ClosingCommentResult;

    /// Advance to the next fallback model; `false` when none is left.
    fn switch_to_next_model(&mut self) -> bool;
}

// Compile-time assertion: Box<dyn AiProvider> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AiProvider>) {}
};

// ---------------------------------------------------------------------------
// TriageProvider
// ---------------------------------------------------------------------------

/// [`AiProvider`] over a concrete vendor backend.
pub struct TriageProvider<B: ChatBackend> {
    backend: B,
    prompts: Arc<PromptStore>,
    engine: RetryEngine,
    processor: ResponseProcessor,
}

/// Anthropic Claude provider.
pub type ClaudeProvider = TriageProvider<ClaudeBackend>;
/// Google Gemini provider.
pub type GeminiProvider = TriageProvider<GeminiBackend>;

impl<B: ChatBackend> TriageProvider<B> {
    pub fn new(
        backend: B,
        prompts: Arc<PromptStore>,
        engine: RetryEngine,
        processor: ResponseProcessor,
    ) -> Self {
        Self {
            backend,
            prompts,
            engine,
            processor,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn classify(
        &mut self,
        text: &str,
        correlation_id: &str,
    ) -> Result<ClassificationResult, AiError> {
        let prompt = self.prompts.render(WORK_TRIAGING, &[("text", text)])?;
        let started = Instant::now();
        let raw = self
            .engine
            .execute(&mut self.backend, ANALYZE_WORK_INTENT, &prompt)
            .await?;
        let value = self.processor.process(
            &raw,
            ANALYZE_WORK_INTENT,
            correlation_id,
            self.backend.provider_name(),
            Some(started),
            true,
        )?;
        Ok(serde_json::from_value(value)?)
    }

    async fn closing_comment(
        &mut self,
        text: &str,
        correlation_id: &str,
    ) -> Result<ClosingCommentResult, AiError> {
        let prompt = self.prompts.render(CLOSING_COMMENT, &[("text", text)])?;
        let started = Instant::now();
        let raw = self
            .engine
            .execute(&mut self.backend, GENERATE_CLOSING_COMMENT, &prompt)
            .await?;
        let value = self.processor.process(
            &raw,
            GENERATE_CLOSING_COMMENT,
            correlation_id,
            self.backend.provider_name(),
            Some(started),
            false,
        )?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl<B: ChatBackend> AiProvider for TriageProvider<B> {
    fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    fn current_model(&self) -> &str {
        self.backend.current_model()
    }

    async fn classify_intent(
        &mut self,
        text: &str,
        correlation_id: Option<&str>,
    ) -> Result<ClassificationResult, AiError> {
        let correlation_id = correlation_id.unwrap_or(UNTRACKED_ID);

        match self.classify(text, correlation_id).await {
            Ok(classification) => {
                if classification.populated_categories() > 1 {
                    log::warn!(
                        "{correlation_id}: {} categories populated, using {}",
                        classification.populated_categories(),
                        classification
                            .category()
                            .map(|c| c.as_str())
                            .unwrap_or("none")
                    );
                }
                Ok(classification)
            }
            Err(e) => {
                log::error!("Failed to analyze work intent ({correlation_id}): {e}");
                Err(e)
            }
        }
    }

    async fn generate_closing_comment(
        &mut self,
        text: &str,
        correlation_id: Option<&str>,
    ) -> ClosingCommentResult {
        let correlation_id = correlation_id.unwrap_or(UNTRACKED_ID);
        match self.closing_comment(text, correlation_id).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Failed to generate closing comment ({correlation_id}): {e}");
                ClosingCommentResult::fallback()
            }
        }
    }

    fn switch_to_next_model(&mut self) -> bool {
        self.backend.switch_to_next_model()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::audit::{NullAuditSink, RawResponseLog};
    use crate::llm::retry::tests::{RecordingSleeper, ScriptedBackend};
    use crate::llm::retry::RetryPolicy;
    use crate::llm::schema::WorkCategory;
    use std::time::Duration;

    const VALID_CLASSIFICATION: &str = r#"Sure! Here is the result:
{"work_requests": [{"title": "Leaking pump", "description": "Pump 3 leaks oil", "status": "pending", "asset_id": "P-3"}],
 "work_orders": [], "inspection_tasks": [], "general_tasks": []}"#;

    fn provider(
        backend: ScriptedBackend,
    ) -> (TriageProvider<ScriptedBackend>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let engine = RetryEngine::with_sleeper(
            RetryPolicy::new(3, Duration::from_secs(1)),
            sleeper.clone(),
        );
        let provider = TriageProvider::new(
            backend,
            Arc::new(PromptStore::builtin()),
            engine,
            ResponseProcessor::new(Arc::new(NullAuditSink)),
        );
        (provider, sleeper)
    }

    #[tokio::test]
    async fn classify_returns_parsed_result() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![Ok(VALID_CLASSIFICATION)]));

        let result = provider
            .classify_intent("pump 3 is leaking oil", Some("wt_001"))
            .await
            .unwrap();
        assert_eq!(result.category(), Some(WorkCategory::WorkRequest));
        assert_eq!(result.work_requests[0].asset_id.as_deref(), Some("P-3"));
    }

    #[tokio::test]
    async fn classify_recovers_from_unavailable_model() {
        let (mut provider, sleeper) = provider(ScriptedBackend::new(vec![
            Err("model XYZ not found"),
            Ok(VALID_CLASSIFICATION),
        ]));

        let result = provider.classify_intent("pump leak", None).await.unwrap();
        assert_eq!(result.work_requests.len(), 1);
        assert_eq!(provider.backend().model_index(), 1);
        assert_eq!(provider.current_model(), "secondary");
        assert_eq!(provider.backend().call_count(), 2);
        assert_eq!(sleeper.delays(), [Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn classify_propagates_malformed_output_without_retrying() {
        let (mut provider, sleeper) = provider(ScriptedBackend::new(vec![
            Ok("I could not decide."),
            Ok(VALID_CLASSIFICATION),
        ]));

        let err = provider.classify_intent("???", None).await.unwrap_err();
        assert!(matches!(err, AiError::NoJsonFound));
        assert_eq!(provider.backend().call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn classify_rejects_schema_mismatch() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![Ok(
            r#"{"work_orders": [{"title": "t", "description": "d"}]}"#,
        )]));

        let err = provider.classify_intent("x", None).await.unwrap_err();
        assert!(matches!(err, AiError::InvalidStructure));
    }

    #[tokio::test]
    async fn classify_surfaces_fatal_errors() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![Err("403 Forbidden")]));

        let err = provider.classify_intent("x", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired Mock API key");
    }

    #[tokio::test]
    async fn closing_comment_parses_downtime() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![Ok(
            "```json\n{\"closing_comment\": \"Replaced worn belt on conveyor 2.\", \"actual_downtime_hours\": 1.5}\n```",
        )]));

        let result = provider
            .generate_closing_comment("swapped the belt, took an hour and a half", Some("cc_001"))
            .await;
        assert_eq!(result.closing_comment, "Replaced worn belt on conveyor 2.");
        assert_eq!(result.actual_downtime_hours, Some(1.5));
        assert!(!result.is_fallback());
    }

    #[tokio::test]
    async fn closing_comment_falls_back_on_exhaustion() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![
            Err("HTTP 503: overloaded"),
            Err("HTTP 503: overloaded"),
            Err("HTTP 503: overloaded"),
        ]));

        let result = provider.generate_closing_comment("done", None).await;
        assert!(result.is_fallback());
        assert_eq!(provider.backend().call_count(), 3);
    }

    #[tokio::test]
    async fn closing_comment_falls_back_on_malformed_output() {
        let (mut provider, _) = provider(ScriptedBackend::new(vec![Ok(
            "{\"summary\": \"no closing comment key\"}",
        )]));

        let result = provider.generate_closing_comment("done", None).await;
        assert_eq!(result, ClosingCommentResult::fallback());
    }

    #[tokio::test]
    async fn raw_reply_is_written_to_audit_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = RawResponseLog::new(dir.path());
        let mut provider = TriageProvider::new(
            ScriptedBackend::new(vec![Ok(VALID_CLASSIFICATION)]),
            Arc::new(PromptStore::builtin()),
            RetryEngine::with_sleeper(RetryPolicy::default(), Arc::new(RecordingSleeper::default())),
            ResponseProcessor::new(Arc::new(audit.clone())),
        );

        provider.classify_intent("leak", Some("wt_042")).await.unwrap();

        let content =
            std::fs::read_to_string(audit.path_for("wt_042", ANALYZE_WORK_INTENT)).unwrap();
        assert!(content.contains("Leaking pump"));
        assert!(content.contains("AI Provider: Mock"));
    }

    #[test]
    fn switch_delegates_to_backend() {
        let (mut provider, _) = provider(ScriptedBackend::with_models(vec![], &["a", "b"]));
        assert!(provider.switch_to_next_model());
        assert!(!provider.switch_to_next_model());
        assert_eq!(provider.current_model(), "b");
    }
}
