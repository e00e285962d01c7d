//! Batch dataset files: the input document and the generated-outputs
//! document.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File name of the generated-outputs document inside `outputs_dir`.
pub const OUTPUT_FILE_NAME: &str = "system_generated_outputs.json";

/// Default input file name inside `inputs_dir`.
pub const INPUT_FILE_NAME: &str = "inputs_only.json";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One transcript to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub test_focus: String,
}

/// Which operation an entry is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    WorkTriaging,
    ClosingComment,
}

impl TaskKind {
    /// Route by id prefix: `cc_` is a closing comment, anything else is
    /// classified.
    pub fn for_id(id: &str) -> Self {
        if id.starts_with("cc_") {
            TaskKind::ClosingComment
        } else {
            TaskKind::WorkTriaging
        }
    }
}

/// The input document.  Either list may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub work_item_triaging: Vec<DatasetEntry>,
    #[serde(default)]
    pub closing_comment: Vec<DatasetEntry>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        let dataset: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset {}", path.display()))?;
        Ok(dataset)
    }

    /// All entries re-grouped by [`TaskKind::for_id`], input order kept.
    pub fn routed(&self) -> (Vec<&DatasetEntry>, Vec<&DatasetEntry>) {
        self.work_item_triaging
            .iter()
            .chain(&self.closing_comment)
            .partition(|entry| TaskKind::for_id(&entry.id) == TaskKind::WorkTriaging)
    }

    pub fn len(&self) -> usize {
        self.work_item_triaging.len() + self.closing_comment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    /// The reply did not match its schema, or the closing comment fell back
    /// to the soft default.
    ValidationFailed,
    Failed,
}

/// One processed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: String,
    pub input: String,
    /// `null` when processing failed.
    pub system_output: Option<Value>,
    pub test_focus: String,
    pub processing_status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The generated-outputs document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub work_item_triaging: Vec<OutputRecord>,
    pub closing_comment: Vec<OutputRecord>,
}

impl BatchOutput {
    /// Write pretty-printed JSON to `outputs_dir/system_generated_outputs.json`
    /// and return the path written.
    pub fn save_in(&self, outputs_dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(outputs_dir)
            .with_context(|| format!("failed to create {}", outputs_dir.display()))?;
        let path = outputs_dir.join(OUTPUT_FILE_NAME);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            triaging: StatusCounts::of(&self.work_item_triaging),
            closing: StatusCounts::of(&self.closing_comment),
        }
    }
}

/// Per-status counts for one list of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub success: usize,
    pub validation_failed: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn of(records: &[OutputRecord]) -> Self {
        records.iter().fold(Self::default(), |mut counts, record| {
            match record.processing_status {
                ProcessingStatus::Success => counts.success += 1,
                ProcessingStatus::ValidationFailed => counts.validation_failed += 1,
                ProcessingStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.success + self.validation_failed + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub triaging: StatusCounts,
    pub closing: StatusCounts,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
