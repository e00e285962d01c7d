//! Batch processing of transcript datasets.
//!
//! # Architecture
//!
//! ```text
//! inputs_only.json ──▶ Dataset::load
//!                         │
//!                         ▼
//!              BatchRunner::run(&mut dyn AiProvider)
//!                         │  (sequential, one entry at a time)
//!                         ▼
//!                    BatchOutput ──▶ save_in(outputs_dir)
//!                         │           └─ system_generated_outputs.json
//!                         ▼
//!   expected_outputs.json ──▶ MetricsReport::evaluate ──▶ save_in(outputs_dir)
//!                                                          └─ metrics.json
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use voice_triage::llm::ProviderFactory;
//! use voice_triage::pipeline::{BatchRunner, Dataset};
//!
//! # async fn example(settings: voice_triage::llm::ProviderSettings) -> anyhow::Result<()> {
//! let mut provider = ProviderFactory::default().build(&settings)?;
//! let dataset = Dataset::load(Path::new("data/inputs/inputs_only.json"))?;
//!
//! let output = BatchRunner::new(true).run(provider.as_mut(), &dataset).await;
//! output.save_in(Path::new("data/outputs"))?;
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod metrics;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use dataset::{
    BatchOutput, BatchSummary, Dataset, DatasetEntry, OutputRecord, ProcessingStatus,
    StatusCounts, TaskKind, INPUT_FILE_NAME, OUTPUT_FILE_NAME,
};
pub use metrics::{ComponentScore, ExpectedOutputs, KindMetrics, MetricsReport, METRICS_FILE_NAME};
pub use runner::BatchRunner;
