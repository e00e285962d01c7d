//! Prompt template store for maintenance-note parsing.
//!
//! [`PromptStore`] holds named templates loaded once per provider instance:
//! * **`work_triaging`** — classify a transcript into work requests, work
//!   orders, inspection tasks or general tasks.
//! * **`closing_comment`** — turn a "work done" transcript into a closing
//!   comment plus actual downtime.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` render as literal braces
//! so the JSON examples inside a prompt survive rendering.  A TOML file with
//! one table per template (`[work_triaging] prompt = """…"""`) replaces the
//! built-in set.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Template id used by `classify_intent`.
pub const WORK_TRIAGING: &str = "work_triaging";
/// Template id used by `generate_closing_comment`.
pub const CLOSING_COMMENT: &str = "closing_comment";

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

const WORK_TRIAGING_TEMPLATE: &str = "\
You are an assistant for an industrial maintenance team.
A technician recorded the voice note below. Decide what kind of work item it describes.

Categories:
1. work_requests    - a problem is reported and someone must decide what to do about it.
2. work_orders      - the work is already defined and approved; it needs to be scheduled or done.
3. inspection_tasks - an asset must be checked, measured or inspected.
4. general_tasks    - anything else that needs doing but is not tied to an asset repair.

Rules:
1. Put the item in exactly ONE category; leave the other lists empty.
2. Every item needs a short title, a description and a status.
3. Fill asset_id, work_type_id and assigned_to only when the note names them, otherwise null.
4. Reply with ONLY the JSON object, no explanation.

Output format:
{{
  \"work_requests\": [],
  \"work_orders\": [],
  \"inspection_tasks\": [],
  \"general_tasks\": [
    {{\"title\": \"...\", \"description\": \"...\", \"status\": \"pending\", \"asset_id\": null, \"work_type_id\": null, \"assigned_to\": null}}
  ]
}}

Voice note:
{text}
";

const CLOSING_COMMENT_TEMPLATE: &str = "\
You are an assistant for an industrial maintenance team.
A technician recorded the voice note below after finishing a job.
Write a concise, professional closing comment for the work order and extract the
actual equipment downtime in hours if the note mentions it.

Rules:
1. Keep the comment factual: what was found, what was done, what is left.
2. actual_downtime_hours is a number of hours, or null when the note does not say.
3. Reply with ONLY the JSON object, no explanation.

Output format:
{{\"closing_comment\": \"...\", \"actual_downtime_hours\": null}}

Voice note:
{text}
";

// ---------------------------------------------------------------------------
// PromptError
// ---------------------------------------------------------------------------

/// Failures while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompts file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid prompts file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Prompt type '{0}' not found")]
    UnknownTemplate(String),

    #[error("Missing template variable '{variable}' in prompt '{template}'")]
    MissingVariable { template: String, variable: String },

    #[error("Malformed placeholder in prompt '{0}'")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// PromptStore
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    prompt: String,
}

/// Immutable map of template id → template text.
///
/// # Example
/// ```rust
/// use voice_triage::llm::PromptStore;
///
/// let store = PromptStore::builtin();
/// let prompt = store.render("work_triaging", &[("text", "pump 3 is leaking")]).unwrap();
/// assert!(prompt.contains("pump 3 is leaking"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<String, String>,
}

impl PromptStore {
    /// The compiled-in `work_triaging` and `closing_comment` templates.
    pub fn builtin() -> Self {
        let templates = [
            (WORK_TRIAGING, WORK_TRIAGING_TEMPLATE),
            (CLOSING_COMMENT, CLOSING_COMMENT_TEMPLATE),
        ]
        .into_iter()
        .map(|(id, text)| (id.to_string(), text.to_string()))
        .collect();
        Self { templates }
    }

    /// Parse a TOML document with one `[id] prompt = "…"` table per template.
    pub fn from_toml_str(content: &str) -> Result<Self, PromptError> {
        let entries: HashMap<String, TemplateEntry> = toml::from_str(content)?;
        let templates = entries
            .into_iter()
            .map(|(id, entry)| (id, entry.prompt))
            .collect();
        Ok(Self { templates })
    }

    /// Load templates from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded {} prompt template(s) from {}",
            store.templates.len(),
            path.display()
        );
        Ok(store)
    }

    /// Whether a template with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Render template `id`, substituting each `{name}` with the matching
    /// value from `vars`.
    pub fn render(&self, id: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self.templates.get(id).ok_or_else(|| {
            log::error!("Prompt type '{id}' not found");
            PromptError::UnknownTemplate(id.to_string())
        })?;

        render_template(id, template, vars).inspect_err(|e| {
            log::error!("Failed to format prompt '{id}': {e}");
        })
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::builtin()
    }
}

fn render_template(id: &str, template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len() + 256);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) if ch.is_alphanumeric() || ch == '_' => name.push(ch),
                        _ => return Err(PromptError::Malformed(id.to_string())),
                    }
                }
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| PromptError::MissingVariable {
                        template: id.to_string(),
                        variable: name.clone(),
                    })?;
                out.push_str(value);
            }
            '}' => return Err(PromptError::Malformed(id.to_string())),
            other => out.push(other),
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
