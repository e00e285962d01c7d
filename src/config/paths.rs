//! Where `settings.toml` and the optional `prompts.toml` live.
//!
//! The platform config directory comes from `dirs::config_dir()`:
//!
//!   Windows: %APPDATA%\voice-triage\
//!   macOS:   ~/Library/Application Support/voice-triage/
//!   Linux:   ~/.config/voice-triage/

use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "voice-triage";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const PROMPTS_FILE_NAME: &str = "prompts.toml";

/// Resolved configuration file locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Prompt template override; only used when the file exists.
    pub prompts_file: PathBuf,
}

impl AppPaths {
    /// Platform config directory, or `./voice-triage` when the platform has
    /// none.
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::in_dir(&base.join(APP_DIR_NAME))
    }

    /// Layout rooted at an explicit directory.
    pub fn in_dir(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            settings_file: config_dir.join(SETTINGS_FILE_NAME),
            prompts_file: config_dir.join(PROMPTS_FILE_NAME),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_paths_end_in_app_dir() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with(APP_DIR_NAME));
        assert!(paths.settings_file.starts_with(&paths.config_dir));
    }

    #[test]
    fn explicit_dir_layout() {
        let root = tempfile::tempdir().unwrap();
        let paths = AppPaths::in_dir(root.path());
        assert_eq!(paths.settings_file, root.path().join("settings.toml"));
        assert_eq!(paths.prompts_file, root.path().join("prompts.toml"));
    }
}
