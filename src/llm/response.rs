//! Turns free-form model replies into validated JSON.
//!
//! Models often wrap their JSON in prose or code fences.  [`extract_json`]
//! finds the first complete top-level object with a string-aware brace
//! scanner; [`ResponseProcessor::process`] then audits, parses and validates
//! it.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::llm::audit::AuditSink;
use crate::llm::error::AiError;
use crate::llm::schema::{self, SchemaKind};

// ---------------------------------------------------------------------------
// extract_json
// ---------------------------------------------------------------------------

/// Return the first balanced `{ … }` object in `raw`.
///
/// Braces inside JSON strings (including escaped quotes) are ignored.  An
/// unbalanced object is skipped and scanning resumes after its opening brace.
pub fn extract_json(raw: &str) -> Result<&str, AiError> {
    let bytes = raw.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = raw[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&bytes[start..]) {
            return Ok(&raw[start..start + end]);
        }
        search_from = start + 1;
    }

    log::error!("No JSON object found in response");
    Err(AiError::NoJsonFound)
}

/// Length of the balanced object starting at `bytes[0] == b'{'`, if any.
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// ResponseProcessor
// ---------------------------------------------------------------------------

/// Audit → extract → parse → validate pipeline for one raw reply.
#[derive(Clone)]
pub struct ResponseProcessor {
    audit: Arc<dyn AuditSink>,
}

impl ResponseProcessor {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Route `data` to the schema chosen by [`SchemaKind::detect`].
    pub fn validate_structure(&self, data: &Value, context: &str) -> bool {
        schema::validate(data, SchemaKind::detect(data), context)
    }

    /// Process one raw reply.
    ///
    /// * The raw text is always handed to the audit sink first.
    /// * Missing or unparsable JSON and (when `validate` is set) a schema
    ///   mismatch fail the whole call; nothing here retries.
    /// * `started`, when given, is used to log the total operation duration.
    pub fn process(
        &self,
        raw: &str,
        operation: &str,
        correlation_id: &str,
        provider: &str,
        started: Option<Instant>,
        validate: bool,
    ) -> Result<Value, AiError> {
        self.audit.record(correlation_id, operation, provider, raw);

        let json_text = extract_json(raw)?;
        let value: Value = serde_json::from_str(json_text).inspect_err(|e| {
            log::error!("Failed to parse JSON for {operation} ({correlation_id}): {e}");
        })?;

        if validate && !self.validate_structure(&value, correlation_id) {
            log::error!("Invalid JSON structure in response");
            return Err(AiError::InvalidStructure);
        }

        if let Some(started) = started {
            log::info!(
                "{operation} | {correlation_id} | Duration: {:.1}s",
                started.elapsed().as_secs_f64()
            );
        }

        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
