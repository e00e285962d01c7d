//! Retry / model-fallback engine shared by every provider.
//!
//! # Attempt loop
//!
//! ```text
//! attempt = 1
//! loop:
//!   send_prompt ──Ok──▶ return text
//!       │
//!       Err ─▶ ErrorClass::classify(message)
//!               ├─ authentication / content_policy / token_limit ─▶ fail now
//!               ├─ attempt == max_retries ─▶ RetriesExhausted
//!               └─ otherwise:
//!                    model_unavailable? ─▶ switch_to_next_model
//!                    sleep(base_delay · 2^(attempt-1))
//!                    attempt += 1
//! ```
//!
//! The switch always happens before the backoff sleep.  Delays go through a
//! [`Sleeper`] so tests can observe them without waiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::llm::backend::ChatBackend;
use crate::llm::error::AiError;

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Classification of a failed vendor call, derived from its message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Authentication,
    ContentPolicy,
    TokenLimit,
    ModelUnavailable,
    Timeout,
    /// Anything not matched by the patterns above.
    ApiError,
}

impl ErrorClass {
    /// Ordered pattern match over the lower-cased message; first match wins.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        let has_any = |terms: &[&str]| terms.iter().any(|t| msg.contains(t));

        if has_any(&["rate_limit", "quota", "billing", "payment"]) {
            ErrorClass::RateLimit
        } else if has_any(&["authentication", "api_key", "unauthorized", "forbidden"]) {
            ErrorClass::Authentication
        } else if has_any(&["content_policy", "harmful", "safety", "violation"]) {
            ErrorClass::ContentPolicy
        } else if msg.contains("token") && has_any(&["limit", "exceeded"]) {
            ErrorClass::TokenLimit
        } else if msg.contains("model") && has_any(&["not found", "unavailable", "not available"])
        {
            ErrorClass::ModelUnavailable
        } else if has_any(&["timeout", "deadline", "timed out"]) {
            ErrorClass::Timeout
        } else {
            ErrorClass::ApiError
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Authentication => "authentication",
            ErrorClass::ContentPolicy => "content_policy",
            ErrorClass::TokenLimit => "token_limit",
            ErrorClass::ModelUnavailable => "model_unavailable",
            ErrorClass::Timeout => "timeout",
            ErrorClass::ApiError => "api_error",
        }
    }

    /// Fatal classes abort the operation on the first occurrence.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorClass::Authentication | ErrorClass::ContentPolicy | ErrorClass::TokenLimit
        )
    }

    /// The user-facing error for a fatal class, `None` otherwise.
    pub fn fatal_error(&self, provider: &str) -> Option<AiError> {
        match self {
            ErrorClass::Authentication => Some(AiError::Authentication {
                provider: provider.to_string(),
            }),
            ErrorClass::ContentPolicy => Some(AiError::ContentPolicy {
                provider: provider.to_string(),
            }),
            ErrorClass::TokenLimit => Some(AiError::TokenLimit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy / RetryAttempt
// ---------------------------------------------------------------------------

/// Retry bound and exponential-backoff base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one.
    pub max_retries: u32,
    /// Delay after the first failure; doubles with every further failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// `base_delay · 2^(attempt-1)`; attempt 1 waits exactly `base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// One failed attempt inside a single `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub class: ErrorClass,
    /// Backoff before the next attempt; `None` when no retry follows.
    pub delay: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Waits out a backoff delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// RetryEngine
// ---------------------------------------------------------------------------

/// Drives repeated [`ChatBackend::send_prompt`] calls under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `operation` against `backend`, retrying and falling back between
    /// models until it succeeds, hits a fatal error or runs out of attempts.
    pub async fn execute<B>(
        &self,
        backend: &mut B,
        operation: &str,
        prompt: &str,
    ) -> Result<String, AiError>
    where
        B: ChatBackend + ?Sized,
    {
        let max_retries = self.policy.max_retries.max(1);
        let provider = backend.provider_name();
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let err = match backend.send_prompt(prompt).await {
                Ok(text) => {
                    log::info!(
                        "{operation} | {provider} ({}) | Duration: {:.1}s",
                        backend.current_model(),
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(text);
                }
                Err(err) => err,
            };

            let message = err.to_string();
            let class = ErrorClass::classify(&message);
            log_classification(provider, class, attempt, max_retries, &message);

            if let Some(fatal) = class.fatal_error(provider) {
                return Err(fatal);
            }

            if attempt >= max_retries {
                let record = RetryAttempt {
                    attempt,
                    class,
                    delay: None,
                };
                log::error!(
                    "Failed to complete {operation} after {max_retries} attempts (last: {record:?})"
                );
                return Err(AiError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: max_retries,
                    last_error: message,
                });
            }

            if class == ErrorClass::ModelUnavailable {
                if backend.switch_to_next_model() {
                    log::info!(
                        "Switched to fallback model {}, retrying {operation}",
                        backend.current_model()
                    );
                } else {
                    log::warn!("No more fallback models available for {operation}");
                }
            }

            let delay = self.policy.delay_for(attempt);
            let record = RetryAttempt {
                attempt,
                class,
                delay: Some(delay),
            };
            log::info!(
                "Retrying {operation} in {:.1}s (attempt {}/{max_retries}, after {})",
                delay.as_secs_f64(),
                record.attempt + 1,
                record.class
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

fn log_classification(provider: &str, class: ErrorClass, attempt: u32, max: u32, message: &str) {
    match class {
        ErrorClass::RateLimit => {
            log::warn!("{provider} rate limit/quota hit on attempt {attempt}/{max}")
        }
        ErrorClass::Authentication => log::error!("{provider} authentication failed: {message}"),
        ErrorClass::ContentPolicy => log::error!("{provider} content policy violation: {message}"),
        ErrorClass::TokenLimit => log::error!("{provider} token limit exceeded: {message}"),
        ErrorClass::ModelUnavailable => {
            log::info!("{provider} model unavailable, will try fallback: {message}")
        }
        ErrorClass::Timeout => {
            log::warn!("{provider} request timeout on attempt {attempt}/{max}")
        }
        ErrorClass::ApiError => {
            log::error!("{provider} API error on attempt {attempt}: {message}")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::backend::ProviderError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Records requested delays instead of waiting.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    /// Replays scripted replies; `Err(msg)` becomes a `ProviderError::Request`.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub calls: Mutex<Vec<String>>,
        models: Vec<String>,
        index: usize,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self::with_models(replies, &["primary", "secondary", "tertiary"])
        }

        pub fn with_models(replies: Vec<Result<&str, &str>>, models: &[&str]) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
                models: models.iter().map(|m| m.to_string()).collect(),
                index: 0,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Models used by each call, in order.
        pub fn models_called(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn provider_name(&self) -> &'static str {
            "Mock"
        }

        fn current_model(&self) -> &str {
            &self.models[self.index]
        }

        fn model_index(&self) -> usize {
            self.index
        }

        async fn send_prompt(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push(self.models[self.index].clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(ProviderError::Request(msg)),
                None => Err(ProviderError::Request("script exhausted".into())),
            }
        }

        fn switch_to_next_model(&mut self) -> bool {
            if self.index + 1 < self.models.len() {
                self.index += 1;
                true
            } else {
                false
            }
        }
    }

    fn engine(max_retries: u32, base: Duration) -> (RetryEngine, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let engine = RetryEngine::with_sleeper(RetryPolicy::new(max_retries, base), sleeper.clone());
        (engine, sleeper)
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[test]
    fn classify_follows_pattern_order() {
        let cases = [
            ("Error: rate_limit_error", ErrorClass::RateLimit),
            ("You exceeded your current quota", ErrorClass::RateLimit),
            ("billing hard limit reached", ErrorClass::RateLimit),
            ("401 Unauthorized", ErrorClass::Authentication),
            ("API_KEY_INVALID", ErrorClass::Authentication),
            ("403 Forbidden", ErrorClass::Authentication),
            ("blocked for SAFETY reasons", ErrorClass::ContentPolicy),
            ("prompt is too long: max token limit", ErrorClass::TokenLimit),
            ("maximum tokens exceeded", ErrorClass::TokenLimit),
            ("model XYZ not found", ErrorClass::ModelUnavailable),
            ("The model is currently unavailable", ErrorClass::ModelUnavailable),
            ("request timed out", ErrorClass::Timeout),
            ("Deadline Exceeded", ErrorClass::Timeout),
            ("HTTP 500: internal error", ErrorClass::ApiError),
        ];
        for (message, expected) in cases {
            assert_eq!(ErrorClass::classify(message), expected, "{message}");
        }
    }

    #[test]
    fn token_and_model_need_their_companion_terms() {
        assert_eq!(ErrorClass::classify("invalid token"), ErrorClass::ApiError);
        assert_eq!(ErrorClass::classify("model overloaded"), ErrorClass::ApiError);
        assert_eq!(ErrorClass::classify("page not found"), ErrorClass::ApiError);
    }

    #[test]
    fn rate_limit_wins_over_later_patterns() {
        // Matches both rate_limit and authentication terms.
        assert_eq!(
            ErrorClass::classify("quota exceeded for api_key"),
            ErrorClass::RateLimit
        );
    }

    #[test]
    fn fatal_classes() {
        assert!(ErrorClass::Authentication.is_fatal());
        assert!(ErrorClass::ContentPolicy.is_fatal());
        assert!(ErrorClass::TokenLimit.is_fatal());
        assert!(!ErrorClass::RateLimit.is_fatal());
        assert!(!ErrorClass::ModelUnavailable.is_fatal());
        assert!(!ErrorClass::Timeout.is_fatal());
        assert!(!ErrorClass::ApiError.is_fatal());
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));
    }

    // -----------------------------------------------------------------------
    // execute
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn success_returns_immediately() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![Ok("{}")]);

        let text = engine.execute(&mut backend, "OP", "prompt").await.unwrap();
        assert_eq!(text, "{}");
        assert_eq!(backend.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_aborts_without_sleeping() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![Err("401 Unauthorized"), Ok("{}")]);

        let err = engine.execute(&mut backend, "OP", "prompt").await.unwrap_err();
        assert!(matches!(err, AiError::Authentication { ref provider } if provider == "Mock"));
        assert_eq!(err.to_string(), "Invalid or expired Mock API key");
        assert_eq!(backend.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn content_policy_and_token_limit_are_fatal() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));

        let mut backend = ScriptedBackend::new(vec![Err("harmful content detected")]);
        let err = engine.execute(&mut backend, "OP", "p").await.unwrap_err();
        assert!(matches!(err, AiError::ContentPolicy { .. }));

        let mut backend = ScriptedBackend::new(vec![Err("input token limit exceeded")]);
        let err = engine.execute(&mut backend, "OP", "p").await.unwrap_err();
        assert!(matches!(err, AiError::TokenLimit));

        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_backs_off_exponentially() {
        let (engine, sleeper) = engine(3, Duration::from_millis(500));
        let mut backend = ScriptedBackend::new(vec![
            Err("rate_limit_error"),
            Err("rate_limit_error"),
            Ok("done"),
        ]);

        let text = engine.execute(&mut backend, "OP", "p").await.unwrap();
        assert_eq!(text, "done");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(
            sleeper.delays(),
            [Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test]
    async fn exhaustion_makes_exactly_max_retries_calls() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![
            Err("HTTP 500: boom"),
            Err("HTTP 500: boom"),
            Err("HTTP 500: boom"),
            Ok("never reached"),
        ]);

        let err = engine
            .execute(&mut backend, "ANALYZE_WORK_INTENT", "p")
            .await
            .unwrap_err();
        match err {
            AiError::RetriesExhausted {
                operation,
                attempts,
                last_error,
            } => {
                assert_eq!(operation, "ANALYZE_WORK_INTENT");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.call_count(), 3);
        assert_eq!(
            sleeper.delays(),
            [Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn timeout_on_last_attempt_is_exhaustion() {
        let (engine, _sleeper) = engine(2, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![Err("request timed out"), Err("request timed out")]);

        let err = engine.execute(&mut backend, "OP", "p").await.unwrap_err();
        assert!(matches!(err, AiError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn model_unavailable_switches_before_retrying() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![Err("model XYZ not found"), Ok("ok")]);

        let text = engine.execute(&mut backend, "OP", "p").await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(backend.models_called(), ["primary", "secondary"]);
        assert_eq!(backend.model_index(), 1);
        assert_eq!(sleeper.delays(), [Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn exhausted_fallback_list_still_retries_current_model() {
        let (engine, sleeper) = engine(3, Duration::from_secs(1));
        let mut backend = ScriptedBackend::with_models(
            vec![Err("model not available"), Ok("ok")],
            &["only"],
        );

        let text = engine.execute(&mut backend, "OP", "p").await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(backend.models_called(), ["only", "only"]);
        assert_eq!(sleeper.delays().len(), 1);
    }

    #[tokio::test]
    async fn zero_max_retries_still_makes_one_call() {
        let (engine, _sleeper) = engine(0, Duration::from_secs(1));
        let mut backend = ScriptedBackend::new(vec![Err("boom")]);

        let err = engine.execute(&mut backend, "OP", "p").await.unwrap_err();
        assert!(matches!(err, AiError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(backend.call_count(), 1);
    }
}
