//! Maintenance voice-note parser: turns free-form transcripts into
//! structured work items and closing comments via Claude or Gemini.

pub mod config;
pub mod llm;
pub mod pipeline;
