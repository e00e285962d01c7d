//! Batch runner — drives every dataset entry through one provider.
//!
//! Entries are processed strictly one after another; the entry id doubles as
//! the correlation id so each call's raw reply lands in its own audit file.
//!
//! ```text
//! Dataset::routed()
//!   ├─ wt_* / other → AiProvider::classify_intent
//!   │     ├─ Ok  → [re-validate] → success | validation_failed
//!   │     └─ Err → failed (error message kept, system_output = null)
//!   └─ cc_*         → AiProvider::generate_closing_comment
//!         └─ fallback result → validation_failed, otherwise success
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::llm::schema::{self, SchemaKind};
use crate::llm::AiProvider;

use super::dataset::{BatchOutput, Dataset, DatasetEntry, OutputRecord, ProcessingStatus};

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Processes a [`Dataset`] into a [`BatchOutput`].
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    validate_outputs: bool,
}

impl BatchRunner {
    /// `validate_outputs` re-checks each result before it is recorded as a
    /// success: closing comments against their schema, classifications
    /// against the schema and the at-most-one-category rule.
    pub fn new(validate_outputs: bool) -> Self {
        Self { validate_outputs }
    }

    /// Run every entry.  Never fails: per-entry errors are recorded in the
    /// output document.
    pub async fn run(&self, provider: &mut dyn AiProvider, dataset: &Dataset) -> BatchOutput {
        let (triage, closing) = dataset.routed();
        log::info!(
            "pipeline: {} entries ({} work triaging, {} closing comments) via {} / {}",
            dataset.len(),
            triage.len(),
            closing.len(),
            provider.provider_name(),
            provider.current_model()
        );

        let mut output = BatchOutput::default();

        for (i, entry) in triage.iter().enumerate() {
            log::info!("pipeline: [{}/{}] classifying {}", i + 1, triage.len(), entry.id);
            let record = self.triage_one(provider, entry).await;
            output.work_item_triaging.push(record);
        }

        for (i, entry) in closing.iter().enumerate() {
            log::info!("pipeline: [{}/{}] closing comment {}", i + 1, closing.len(), entry.id);
            let record = self.closing_one(provider, entry).await;
            output.closing_comment.push(record);
        }

        let summary = output.summary();
        log::info!(
            "pipeline: work triaging: {} succeeded, {} failed validation, {} failed",
            summary.triaging.success,
            summary.triaging.validation_failed,
            summary.triaging.failed
        );
        log::info!(
            "pipeline: closing comments: {} succeeded, {} failed validation, {} failed",
            summary.closing.success,
            summary.closing.validation_failed,
            summary.closing.failed
        );

        output
    }

    async fn triage_one(&self, provider: &mut dyn AiProvider, entry: &DatasetEntry) -> OutputRecord {
        match provider.classify_intent(&entry.input, Some(&entry.id)).await {
            Ok(result) => {
                let (value, mut status) =
                    self.checked(&result, SchemaKind::Classification, &entry.id);
                // A typed result always passes the schema; the single-category
                // rule is what can still fail here.
                if self.validate_outputs && result.populated_categories() > 1 {
                    log::warn!(
                        "pipeline: {} populates {} categories",
                        entry.id,
                        result.populated_categories()
                    );
                    status = ProcessingStatus::ValidationFailed;
                }
                record(entry, value, status, None)
            }
            Err(e) => {
                log::error!("pipeline: {} failed: {e}", entry.id);
                record(entry, None, ProcessingStatus::Failed, Some(e.to_string()))
            }
        }
    }

    async fn closing_one(&self, provider: &mut dyn AiProvider, entry: &DatasetEntry) -> OutputRecord {
        let result = provider.generate_closing_comment(&entry.input, Some(&entry.id)).await;
        if result.is_fallback() {
            log::warn!("pipeline: {} produced the fallback closing comment", entry.id);
            let value = serde_json::to_value(&result).ok();
            return record(entry, value, ProcessingStatus::ValidationFailed, None);
        }
        let (value, status) = self.checked(&result, SchemaKind::ClosingComment, &entry.id);
        record(entry, value, status, None)
    }

    fn checked<T: Serialize>(
        &self,
        result: &T,
        kind: SchemaKind,
        id: &str,
    ) -> (Option<Value>, ProcessingStatus) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                log::error!("pipeline: {id} result could not be serialized: {e}");
                return (None, ProcessingStatus::ValidationFailed);
            }
        };
        if self.validate_outputs && !schema::validate(&value, kind, id) {
            return (Some(value), ProcessingStatus::ValidationFailed);
        }
        (Some(value), ProcessingStatus::Success)
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

fn record(
    entry: &DatasetEntry,
    system_output: Option<Value>,
    processing_status: ProcessingStatus,
    error: Option<String>,
) -> OutputRecord {
    OutputRecord {
        id: entry.id.clone(),
        input: entry.input.clone(),
        system_output,
        test_focus: entry.test_focus.clone(),
        processing_status,
        error,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AiError, ClassificationResult, ClosingCommentResult, WorkItem};
    use async_trait::async_trait;

    /// Provider double: fails classification for ids containing "bad",
    /// populates two categories for ids containing "multi", and falls back
    /// for closing comments whose text contains "garbled".
    #[derive(Default)]
    struct FakeProvider {
        seen: Vec<String>,
    }

    #[async_trait]
    impl AiProvider for FakeProvider {
        fn provider_name(&self) -> &'static str {
            "Fake"
        }

        fn current_model(&self) -> &str {
            "fake-1"
        }

        async fn classify_intent(
            &mut self,
            text: &str,
            correlation_id: Option<&str>,
        ) -> Result<ClassificationResult, AiError> {
            let id = correlation_id.unwrap_or_default().to_string();
            self.seen.push(id.clone());
            if id.contains("bad") {
                return Err(AiError::RetriesExhausted {
                    operation: "ANALYZE_WORK_INTENT".into(),
                    attempts: 3,
                    last_error: "HTTP 503".into(),
                });
            }
            let item = WorkItem {
                title: "Fix".into(),
                description: text.into(),
                status: "draft".into(),
                asset_id: None,
                work_type_id: None,
                assigned_to: None,
                comment: None,
                user_query: None,
            };
            let inspections = if id.contains("multi") {
                vec![item.clone()]
            } else {
                Vec::new()
            };
            Ok(ClassificationResult {
                work_orders: vec![item],
                inspection_tasks: inspections,
                ..Default::default()
            })
        }

        async fn generate_closing_comment(
            &mut self,
            text: &str,
            correlation_id: Option<&str>,
        ) -> ClosingCommentResult {
            self.seen.push(correlation_id.unwrap_or_default().to_string());
            if text.contains("garbled") {
                return ClosingCommentResult::fallback();
            }
            ClosingCommentResult {
                closing_comment: format!("Done: {text}"),
                actual_downtime_hours: Some(1.5),
            }
        }

        fn switch_to_next_model(&mut self) -> bool {
            false
        }
    }

    fn entry(id: &str, input: &str) -> DatasetEntry {
        DatasetEntry {
            id: id.into(),
            input: input.into(),
            test_focus: "focus".into(),
        }
    }

    #[tokio::test]
    async fn records_status_per_entry() {
        let dataset = Dataset {
            work_item_triaging: vec![entry("wt_001", "leak"), entry("wt_bad", "noise")],
            closing_comment: vec![entry("cc_001", "replaced seal"), entry("cc_002", "garbled")],
        };
        let mut provider = FakeProvider::default();

        let output = BatchRunner::default().run(&mut provider, &dataset).await;

        assert_eq!(provider.seen, ["wt_001", "wt_bad", "cc_001", "cc_002"]);

        let ok = &output.work_item_triaging[0];
        assert_eq!(ok.processing_status, ProcessingStatus::Success);
        assert_eq!(ok.test_focus, "focus");
        assert_eq!(
            ok.system_output.as_ref().unwrap()["work_orders"][0]["description"],
            "leak"
        );

        let failed = &output.work_item_triaging[1];
        assert_eq!(failed.processing_status, ProcessingStatus::Failed);
        assert!(failed.system_output.is_none());
        assert!(failed.error.as_deref().unwrap().contains("after 3 attempts"));

        assert_eq!(output.closing_comment[0].processing_status, ProcessingStatus::Success);
        assert_eq!(
            output.closing_comment[0].system_output.as_ref().unwrap()["actual_downtime_hours"],
            1.5
        );
        let fell_back = &output.closing_comment[1];
        assert_eq!(fell_back.processing_status, ProcessingStatus::ValidationFailed);
        assert_eq!(
            fell_back.system_output.as_ref().unwrap()["closing_comment"],
            "Error generating closing comment"
        );

        let summary = output.summary();
        assert_eq!(summary.triaging.success, 1);
        assert_eq!(summary.triaging.failed, 1);
        assert_eq!(summary.closing.validation_failed, 1);
    }

    #[tokio::test]
    async fn several_categories_fail_validation_only_when_enabled() {
        let dataset = Dataset {
            work_item_triaging: vec![entry("wt_multi", "leak and inspection")],
            closing_comment: vec![],
        };

        let mut provider = FakeProvider::default();
        let strict = BatchRunner::new(true).run(&mut provider, &dataset).await;
        let rec = &strict.work_item_triaging[0];
        assert_eq!(rec.processing_status, ProcessingStatus::ValidationFailed);
        assert!(rec.system_output.is_some());

        let lenient = BatchRunner::new(false).run(&mut provider, &dataset).await;
        assert_eq!(
            lenient.work_item_triaging[0].processing_status,
            ProcessingStatus::Success
        );
    }

    #[tokio::test]
    async fn stray_closing_id_is_routed_to_closing_comment() {
        let dataset = Dataset {
            work_item_triaging: vec![entry("cc_009", "tightened bolts")],
            closing_comment: vec![],
        };
        let mut provider = FakeProvider::default();

        let output = BatchRunner::new(false).run(&mut provider, &dataset).await;

        assert!(output.work_item_triaging.is_empty());
        assert_eq!(output.closing_comment.len(), 1);
        assert_eq!(output.closing_comment[0].id, "cc_009");
    }

    #[tokio::test]
    async fn empty_dataset_produces_empty_output() {
        let mut provider = FakeProvider::default();
        let output = BatchRunner::default().run(&mut provider, &Dataset::default()).await;
        assert!(output.work_item_triaging.is_empty());
        assert!(output.closing_comment.is_empty());
        assert!(provider.seen.is_empty());
    }
}
