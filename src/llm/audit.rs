//! Raw model output audit trail.
//!
//! Every reply is written verbatim before it is parsed, one text file per
//! `(correlation id, operation)` pair, so a bad classification can be traced
//! back to exactly what the vendor returned.

use std::path::{Path, PathBuf};

/// Correlation id used when the caller does not supply one.
pub const UNTRACKED_ID: &str = "untracked";

/// Destination for raw vendor replies.  Failures are logged, never raised.
pub trait AuditSink: Send + Sync {
    fn record(&self, correlation_id: &str, operation: &str, provider: &str, raw: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _correlation_id: &str, _operation: &str, _provider: &str, _raw: &str) {}
}

/// Writes `{outputs_dir}/llm_raw/{correlation_id}_{operation}.txt`.
#[derive(Debug, Clone)]
pub struct RawResponseLog {
    dir: PathBuf,
}

impl RawResponseLog {
    /// `outputs_dir` is the run's output directory; files go into its
    /// `llm_raw` subdirectory.
    pub fn new(outputs_dir: &Path) -> Self {
        Self {
            dir: outputs_dir.join("llm_raw"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the reply for this pair is written to.
    pub fn path_for(&self, correlation_id: &str, operation: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.txt",
            sanitize(correlation_id),
            sanitize(operation)
        ))
    }

    fn write(&self, correlation_id: &str, operation: &str, provider: &str, raw: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(correlation_id, operation);
        let rule = "=".repeat(50);
        let content = format!(
            "Test ID: {correlation_id}\nPrompt Type: {operation}\nAI Provider: {provider}\n{rule}\nRAW LLM RESPONSE:\n{rule}\n{raw}\n{rule}\n"
        );
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

impl AuditSink for RawResponseLog {
    fn record(&self, correlation_id: &str, operation: &str, provider: &str, raw: &str) {
        match self.write(correlation_id, operation, provider, raw) {
            Ok(path) => log::debug!("Raw LLM output saved to {}", path.display()),
            Err(e) => log::error!("Failed to save raw LLM output: {e}"),
        }
    }
}

/// Keep ids usable as a single path component.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        UNTRACKED_ID.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_header_and_raw_body() {
        let dir = tempdir().expect("temp dir");
        let sink = RawResponseLog::new(dir.path());

        sink.record("wt_001", "ANALYZE_WORK_INTENT", "Claude", "{\"general_tasks\": []}");

        let path = dir.path().join("llm_raw").join("wt_001_ANALYZE_WORK_INTENT.txt");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Test ID: wt_001\nPrompt Type: ANALYZE_WORK_INTENT\n"));
        assert!(content.contains("AI Provider: Claude"));
        assert!(content.contains("RAW LLM RESPONSE:"));
        assert!(content.contains("{\"general_tasks\": []}"));
    }

    #[test]
    fn later_write_replaces_earlier_one() {
        let dir = tempdir().expect("temp dir");
        let sink = RawResponseLog::new(dir.path());

        sink.record("cc_001", "GENERATE_CLOSING_COMMENT", "Gemini", "first");
        sink.record("cc_001", "GENERATE_CLOSING_COMMENT", "Gemini", "second");

        let content =
            std::fs::read_to_string(sink.path_for("cc_001", "GENERATE_CLOSING_COMMENT")).unwrap();
        assert!(content.contains("second"));
        assert!(!content.contains("first"));
    }

    #[test]
    fn ids_cannot_escape_the_directory() {
        let sink = RawResponseLog::new(Path::new("/out"));
        let path = sink.path_for("../../etc/passwd", "OP");
        assert_eq!(path.parent(), Some(Path::new("/out/llm_raw")));
        assert_eq!(
            sink.path_for("..", "OP").file_name().unwrap(),
            "untracked_OP.txt"
        );
    }

    #[test]
    fn unwritable_directory_is_not_an_error() {
        let dir = tempdir().expect("temp dir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // `llm_raw` cannot be created below a regular file.
        let sink = RawResponseLog::new(&blocker);
        sink.record("wt_001", "OP", "Claude", "raw");
        assert!(!sink.path_for("wt_001", "OP").exists());
    }
}
