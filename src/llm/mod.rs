//! AI-provider layer for maintenance voice notes.
//!
//! This module provides:
//! * [`AiProvider`] — `classify_intent` / `generate_closing_comment` /
//!   `switch_to_next_model`, the interface callers hold.
//! * [`TriageProvider`] — implements [`AiProvider`] for any [`ChatBackend`]
//!   ([`ClaudeBackend`], [`GeminiBackend`]).
//! * [`RetryEngine`] — error classification, retry with exponential backoff,
//!   model fallback.
//! * [`ResponseProcessor`] / [`extract_json`] — raw reply → validated JSON.
//! * [`PromptStore`] — named prompt templates.
//! * [`ProviderFactory`] / [`ProviderSettings`] — validated construction.
//! * [`AiError`] — terminal error taxonomy.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_triage::config::ProviderKind;
//! use voice_triage::llm::{NullAuditSink, PromptStore, ProviderFactory, ProviderSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings =
//!         ProviderSettings::new(ProviderKind::Claude, "sk-ant-…", "claude-3-5-sonnet-20241022")
//!             .unwrap();
//!     let factory = ProviderFactory::new(PromptStore::builtin(), Arc::new(NullAuditSink));
//!     let mut provider = factory.build(&settings).unwrap();
//!
//!     let result = provider
//!         .classify_intent("pump 3 on line B is leaking oil again", Some("wt_001"))
//!         .await
//!         .unwrap();
//!     println!("{:?}", result.category());
//! }
//! ```

pub mod audit;
pub mod backend;
pub mod error;
pub mod factory;
pub mod prompt;
pub mod provider;
pub mod response;
pub mod retry;
pub mod schema;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use audit::{AuditSink, NullAuditSink, RawResponseLog};
pub use backend::{ChatBackend, ClaudeBackend, GeminiBackend, ModelRoster, ProviderError};
pub use error::AiError;
pub use factory::{ProviderFactory, ProviderSettings};
pub use prompt::{PromptError, PromptStore};
pub use provider::{AiProvider, ClaudeProvider, GeminiProvider, TriageProvider};
pub use response::{extract_json, ResponseProcessor};
pub use retry::{ErrorClass, RetryAttempt, RetryEngine, RetryPolicy, Sleeper, TokioSleeper};
pub use schema::{
    ClassificationResult, ClosingCommentResult, SchemaKind, WorkCategory, WorkItem,
};
