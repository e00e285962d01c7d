//! Configuration module for the maintenance voice-note parser.
//!
//! Provides `AppConfig` (top-level settings), sub-configs per concern,
//! `AppPaths` for cross-platform config directories, `ApiKeys` for vendor
//! credentials, and TOML persistence via `AppConfig::load` / `AppConfig::save_to`.

pub mod credentials;
pub mod paths;
pub mod settings;

pub use credentials::ApiKeys;
pub use paths::AppPaths;
pub use settings::{AiConfig, AppConfig, PathsConfig, ProcessingConfig, ProviderKind, RetryConfig};
