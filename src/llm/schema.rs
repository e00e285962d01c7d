//! Output shapes returned by the model and their validation.
//!
//! Two shapes are accepted:
//! * [`ClassificationResult`] — four lists of [`WorkItem`]s, one per
//!   [`WorkCategory`].  Missing lists default to empty.
//! * [`ClosingCommentResult`] — a comment plus optional downtime hours.
//!
//! [`validate`] never raises: any mismatch is logged and reported as `false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comment used when closing-comment generation fails.
pub const FALLBACK_CLOSING_COMMENT: &str = "Error generating closing comment";

// ---------------------------------------------------------------------------
// WorkCategory
// ---------------------------------------------------------------------------

/// The four mutually exclusive classification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkCategory {
    WorkRequest,
    WorkOrder,
    InspectionTask,
    GeneralTask,
}

impl WorkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkCategory::WorkRequest => "work_request",
            WorkCategory::WorkOrder => "work_order",
            WorkCategory::InspectionTask => "inspection_task",
            WorkCategory::GeneralTask => "general_task",
        }
    }
}

impl std::fmt::Display for WorkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkItem / ClassificationResult
// ---------------------------------------------------------------------------

/// A single work item inside any of the four category lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub title: String,
    pub description: String,
    /// e.g. `pending`, `draft`, `approved`, `in_progress`, `completed`.
    pub status: String,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub work_type_id: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
}

/// Structured result of `classify_intent`.
///
/// Only one list is expected to be non-empty; that list is the chosen
/// category (see [`ClassificationResult::category`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub work_requests: Vec<WorkItem>,
    #[serde(default)]
    pub work_orders: Vec<WorkItem>,
    #[serde(default)]
    pub inspection_tasks: Vec<WorkItem>,
    #[serde(default)]
    pub general_tasks: Vec<WorkItem>,
}

impl ClassificationResult {
    fn lists(&self) -> [(WorkCategory, &Vec<WorkItem>); 4] {
        [
            (WorkCategory::WorkRequest, &self.work_requests),
            (WorkCategory::WorkOrder, &self.work_orders),
            (WorkCategory::InspectionTask, &self.inspection_tasks),
            (WorkCategory::GeneralTask, &self.general_tasks),
        ]
    }

    /// The first non-empty list, in declaration order.
    pub fn category(&self) -> Option<WorkCategory> {
        self.lists()
            .into_iter()
            .find(|(_, items)| !items.is_empty())
            .map(|(category, _)| category)
    }

    /// Number of non-empty category lists (normally 0 or 1).
    pub fn populated_categories(&self) -> usize {
        self.lists()
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .count()
    }

    /// Items of the chosen category, or an empty slice.
    pub fn items(&self) -> &[WorkItem] {
        self.lists()
            .into_iter()
            .find(|(_, items)| !items.is_empty())
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// ClosingCommentResult
// ---------------------------------------------------------------------------

/// Structured result of `generate_closing_comment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingCommentResult {
    pub closing_comment: String,
    #[serde(default)]
    pub actual_downtime_hours: Option<f64>,
}

impl ClosingCommentResult {
    /// Soft default returned when generation fails.
    pub fn fallback() -> Self {
        Self {
            closing_comment: FALLBACK_CLOSING_COMMENT.to_string(),
            actual_downtime_hours: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.closing_comment == FALLBACK_CLOSING_COMMENT && self.actual_downtime_hours.is_none()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Which output shape to validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Classification,
    ClosingComment,
}

impl SchemaKind {
    /// Pick the schema for a parsed reply: the presence of `closing_comment`
    /// selects the closing-comment shape.
    pub fn detect(data: &Value) -> Self {
        if data.get("closing_comment").is_some() {
            SchemaKind::ClosingComment
        } else {
            SchemaKind::Classification
        }
    }
}

/// Check `data` against `kind`.  Returns `false` and logs on any mismatch.
///
/// `context` identifies the request in the log line (e.g. a correlation id).
pub fn validate(data: &Value, kind: SchemaKind, context: &str) -> bool {
    match check(data, kind) {
        Ok(()) => true,
        Err(reason) => {
            log::error!("Schema validation failed for {context}: {reason}");
            false
        }
    }
}

fn check(data: &Value, kind: SchemaKind) -> Result<(), String> {
    let object = data
        .as_object()
        .ok_or_else(|| "top-level value is not an object".to_string())?;

    match kind {
        SchemaKind::Classification => {
            // serde accepts sequences for structs, so shape is checked first.
            for key in ["work_requests", "work_orders", "inspection_tasks", "general_tasks"] {
                if let Some(Value::Array(items)) = object.get(key) {
                    if let Some(pos) = items.iter().position(|item| !item.is_object()) {
                        return Err(format!("{key}[{pos}] is not an object"));
                    }
                }
            }
            serde_json::from_value::<ClassificationResult>(data.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        SchemaKind::ClosingComment => serde_json::from_value::<ClosingCommentResult>(data.clone())
            .map(|_| ())
            .map_err(|e| e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
