//! Scores a [`BatchOutput`] against a labelled expected-outputs document.
//!
//! Per kind (work triaging, closing comments) the report carries:
//!
//! * `schema_compliance`: % of records whose `system_output` passes its
//!   schema.
//! * `processing_success`: % of records with a non-empty `system_output`
//!   object.
//! * `average_accuracy`: mean per-entry field agreement with the expected
//!   output, over entries that have one.  Work triaging compares category,
//!   asset, status, work type and assignment; closing comments compare
//!   downtime and whether both sides carry a comment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::schema::{self, SchemaKind, WorkCategory};

use super::dataset::{BatchOutput, OutputRecord};

/// File name of the metrics document inside `outputs_dir`.
pub const METRICS_FILE_NAME: &str = "metrics.json";

const TRIAGING_FORMULA: &str = "Category + Asset + Status + Work Type + Assignment (each 0-100%)";
const CLOSING_FORMULA: &str = "Downtime + Comment Population (each 0-100%)";

/// Downtime values closer than this count as equal.
const DOWNTIME_TOLERANCE: f64 = 0.01;

const CATEGORY_KEYS: [(&str, WorkCategory); 4] = [
    ("work_requests", WorkCategory::WorkRequest),
    ("work_orders", WorkCategory::WorkOrder),
    ("inspection_tasks", WorkCategory::InspectionTask),
    ("general_tasks", WorkCategory::GeneralTask),
];

// ---------------------------------------------------------------------------
// Expected outputs
// ---------------------------------------------------------------------------

/// One labelled entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedEntry {
    pub id: String,
    #[serde(default)]
    pub expected_output: Value,
}

/// The labelled reference document.  Either list may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpectedOutputs {
    #[serde(default)]
    pub work_item_triaging: Vec<ExpectedEntry>,
    #[serde(default)]
    pub closing_comment: Vec<ExpectedEntry>,
}

impl ExpectedOutputs {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read expected outputs {}", path.display()))?;
        let expected: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse expected outputs {}", path.display()))?;
        Ok(expected)
    }

    pub fn is_empty(&self) -> bool {
        self.work_item_triaging.is_empty() && self.closing_comment.is_empty()
    }
}

/// Expected output for `id`, skipping empty labels.
fn lookup<'a>(entries: &'a [ExpectedEntry], id: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| &entry.expected_output)
        .filter(|output| output.as_object().is_some_and(|o| !o.is_empty()))
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Running total for one compared field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComponentScore {
    pub total: f64,
    pub count: usize,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindMetrics {
    pub total_inputs: usize,
    pub schema_compliance: f64,
    pub processing_success: f64,
    pub average_accuracy: f64,
    pub accuracy_formula: String,
    pub accuracy_breakdown: BTreeMap<String, ComponentScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub work_triaging: KindMetrics,
    pub closing_comments: KindMetrics,
}

impl MetricsReport {
    /// Score `output` against `expected`.
    pub fn evaluate(output: &BatchOutput, expected: &ExpectedOutputs) -> Self {
        let have_labels = !expected.is_empty();
        Self {
            work_triaging: score_kind(
                &output.work_item_triaging,
                SchemaKind::Classification,
                TRIAGING_FORMULA,
                have_labels,
                |id, system| {
                    lookup(&expected.work_item_triaging, id).map(|exp| triage_fields(system, exp))
                },
            ),
            closing_comments: score_kind(
                &output.closing_comment,
                SchemaKind::ClosingComment,
                CLOSING_FORMULA,
                have_labels,
                |id, system| {
                    lookup(&expected.closing_comment, id).map(|exp| closing_fields(system, exp))
                },
            ),
        }
    }

    /// Write pretty-printed JSON to `outputs_dir/metrics.json`.
    pub fn save_in(&self, outputs_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(outputs_dir)
            .with_context(|| format!("failed to create {}", outputs_dir.display()))?;
        let path = outputs_dir.join(METRICS_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn score_kind<F>(
    records: &[OutputRecord],
    kind: SchemaKind,
    formula: &str,
    have_labels: bool,
    compare: F,
) -> KindMetrics
where
    F: Fn(&str, &Value) -> Option<Vec<(&'static str, bool)>>,
{
    let total_inputs = records.len();
    let mut schema_ok = 0;
    let mut processed = 0;
    let mut breakdown: BTreeMap<String, ComponentScore> = BTreeMap::new();
    let mut accuracy_sum = 0.0;
    let mut scored = 0;

    for record in records {
        let system = record.system_output.as_ref().unwrap_or(&Value::Null);

        if record.system_output.is_some() && schema::validate(system, kind, &record.id) {
            schema_ok += 1;
        }
        if system.as_object().is_some_and(|o| !o.is_empty()) {
            processed += 1;
        }

        if !have_labels {
            continue;
        }
        let Some(fields) = compare(&record.id, system) else {
            continue;
        };
        let matched = fields.iter().filter(|(_, ok)| *ok).count();
        accuracy_sum += matched as f64 / fields.len().max(1) as f64 * 100.0;
        scored += 1;
        for (name, ok) in fields {
            let component = breakdown.entry(name.to_string()).or_default();
            component.total += if ok { 100.0 } else { 0.0 };
            component.count += 1;
        }
    }

    for component in breakdown.values_mut() {
        component.average = component.total / component.count as f64;
    }

    KindMetrics {
        total_inputs,
        schema_compliance: round2(percent(schema_ok, total_inputs)),
        processing_success: round2(percent(processed, total_inputs)),
        average_accuracy: round2(if scored > 0 { accuracy_sum / scored as f64 } else { 0.0 }),
        accuracy_formula: formula.to_string(),
        accuracy_breakdown: breakdown,
    }
}

// ---------------------------------------------------------------------------
// Field comparisons
// ---------------------------------------------------------------------------

fn triage_fields(system: &Value, expected: &Value) -> Vec<(&'static str, bool)> {
    let field = |name: &str| item_field(system, name) == item_field(expected, name);
    vec![
        ("category", category_of(system) == category_of(expected)),
        ("asset", field("asset_id")),
        ("status", field("status")),
        ("work_type", field("work_type_id")),
        ("assignment", field("assigned_to")),
    ]
}

fn closing_fields(system: &Value, expected: &Value) -> Vec<(&'static str, bool)> {
    vec![
        ("downtime", downtime_matches(system, expected)),
        ("comment_population", has_comment(system) && has_comment(expected)),
    ]
}

/// First non-empty category list, in declaration order.
fn first_populated(output: &Value) -> Option<(WorkCategory, &Vec<Value>)> {
    CATEGORY_KEYS.iter().find_map(|(key, category)| {
        output[*key]
            .as_array()
            .filter(|items| !items.is_empty())
            .map(|items| (*category, items))
    })
}

fn category_of(output: &Value) -> Option<WorkCategory> {
    first_populated(output).map(|(category, _)| category)
}

/// `name` of the first item of the chosen category; missing reads as null.
fn item_field<'a>(output: &'a Value, name: &str) -> &'a Value {
    first_populated(output)
        .and_then(|(_, items)| items[0].get(name))
        .unwrap_or(&Value::Null)
}

fn downtime_matches(system: &Value, expected: &Value) -> bool {
    let (sys, exp) = (&system["actual_downtime_hours"], &expected["actual_downtime_hours"]);
    match (sys.is_null(), exp.is_null()) {
        (true, true) => true,
        (false, false) => match (sys.as_f64(), exp.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < DOWNTIME_TOLERANCE,
            _ => false,
        },
        _ => false,
    }
}

fn has_comment(output: &Value) -> bool {
    output["closing_comment"]
        .as_str()
        .is_some_and(|c| !c.is_empty())
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
