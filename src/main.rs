//! Application entry point — maintenance voice-note parser.
//!
//! # Startup sequence
//!
//! 1. Load `.env` (if present) so API keys can live next to the binary.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] (`--config` path or the platform default), apply
//!    command-line overrides, validate.
//! 4. Load prompt templates (override file or built-ins).
//! 5. Build the provider for the configured vendor.
//! 6. Run the requested subcommand.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use voice_triage::{
    config::{ApiKeys, AppConfig, AppPaths, ProviderKind},
    llm::{AiProvider, PromptStore, ProviderFactory, ProviderSettings, RawResponseLog},
    pipeline::{BatchRunner, Dataset, ExpectedOutputs, MetricsReport, INPUT_FILE_NAME},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "voice-triage",
    version,
    about = "Turn maintenance voice-note transcripts into structured work items"
)]
struct Cli {
    /// Settings file; defaults to the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vendor override: claude or gemini
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Primary model override
    #[arg(long, global = true)]
    model: Option<String>,

    /// Output directory override (results and llm_raw/ audit files)
    #[arg(long, global = true)]
    outputs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one transcript into a work category
    Classify {
        /// Transcript text; read from stdin when omitted
        text: Option<String>,
        /// Correlation id used to name the audit file
        #[arg(long)]
        id: Option<String>,
    },

    /// Write a closing comment for one completed-work transcript
    Comment {
        /// Transcript text; read from stdin when omitted
        text: Option<String>,
        /// Correlation id used to name the audit file
        #[arg(long)]
        id: Option<String>,
    },

    /// Process a dataset file and save system_generated_outputs.json
    Batch {
        /// Dataset file; defaults to <inputs_dir>/inputs_only.json
        #[arg(long)]
        input: Option<PathBuf>,
        /// Labelled expected outputs; when given, metrics.json is written too
        #[arg(long)]
        expected: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Startup helpers
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e:#}); using defaults");
            AppConfig::default()
        }),
    };

    if let Some(provider) = cli.provider {
        config.ai.provider = provider;
        // A vendor switch without an explicit model starts from that vendor's default.
        if cli.model.is_none() {
            config.ai.model = provider.default_model().to_string();
        }
    }
    if let Some(model) = &cli.model {
        config.ai.model = model.clone();
    }
    if let Some(dir) = &cli.outputs_dir {
        config.paths.outputs_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Explicit override file, then `prompts.toml` in the config directory, then
/// the built-in templates.
fn load_prompts(config: &AppConfig) -> PromptStore {
    let candidate = config
        .paths
        .prompts_file
        .clone()
        .or_else(|| Some(AppPaths::new().prompts_file).filter(|p| p.exists()));

    let Some(path) = candidate else {
        return PromptStore::builtin();
    };

    match PromptStore::load_from(&path) {
        Ok(store) => {
            log::info!("Loaded prompt templates from {}", path.display());
            store
        }
        Err(e) => {
            log::warn!(
                "Could not load prompts from {} ({e}); using built-in templates",
                path.display()
            );
            PromptStore::builtin()
        }
    }
}

fn read_text(text: Option<String>) -> Result<String> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read transcript from stdin")?;
            buf
        }
    };
    let text = text.trim().to_string();
    anyhow::ensure!(!text.is_empty(), "transcript text is empty");
    Ok(text)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn run_batch(
    provider: &mut dyn AiProvider,
    config: &AppConfig,
    input: Option<PathBuf>,
    expected: Option<PathBuf>,
) -> Result<()> {
    let input = input.unwrap_or_else(|| config.paths.inputs_dir.join(INPUT_FILE_NAME));
    let dataset = Dataset::load(&input)?;
    if dataset.is_empty() {
        log::warn!("{} contains no entries", input.display());
    }

    let runner = BatchRunner::new(config.processing.validate_outputs);
    let output = runner.run(provider, &dataset).await;
    let path = output.save_in(&config.paths.outputs_dir)?;
    log::info!("Results saved to {}", path.display());

    let summary = output.summary();
    println!(
        "work triaging: {}/{} succeeded, closing comments: {}/{} succeeded -> {}",
        summary.triaging.success,
        summary.triaging.total(),
        summary.closing.success,
        summary.closing.total(),
        path.display()
    );

    if let Some(expected) = expected {
        let expected = ExpectedOutputs::load(&expected)?;
        if expected.is_empty() {
            log::warn!("expected outputs contain no entries, accuracy will be zero");
        }
        let report = MetricsReport::evaluate(&output, &expected);
        let path = report.save_in(&config.paths.outputs_dir)?;
        log::info!("Metrics saved to {}", path.display());
        print_json(&report)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Environment (.env is optional)
    dotenvy::dotenv().ok();

    // 2. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 3. Configuration
    let config = load_config(&cli)?;
    log::info!(
        "Voice triage starting (provider: {}, model: {})",
        config.ai.provider,
        config.ai.model
    );

    // 4. Credentials + prompts
    let keys = ApiKeys::from_env();
    let api_key = keys.key_for(config.ai.provider)?;
    let settings = ProviderSettings::from_config(&config, api_key)?;
    let prompts = load_prompts(&config);

    // 5. Provider
    let audit = Arc::new(RawResponseLog::new(&config.paths.outputs_dir));
    let mut provider = ProviderFactory::new(prompts, audit).build(&settings)?;

    // 6. Command
    match cli.command {
        Command::Classify { text, id } => {
            let text = read_text(text)?;
            let result = provider.classify_intent(&text, id.as_deref()).await?;
            print_json(&result)
        }
        Command::Comment { text, id } => {
            let text = read_text(text)?;
            let result = provider.generate_closing_comment(&text, id.as_deref()).await;
            print_json(&result)
        }
        Command::Batch { input, expected } => {
            run_batch(provider.as_mut(), &config, input, expected).await
        }
    }
}
