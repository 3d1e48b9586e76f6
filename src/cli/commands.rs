//! CLI command definitions for note-forge.
//!
//! Every command operates on the persisted queue file, so topics can be added,
//! reviewed and approved between runs.

use crate::generator::LlmNoteGenerator;
use crate::llm::{OpenRouterProvider, ProviderRegistry, OPENROUTER};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{
    ItemStatus, PipelineConfig, ProviderConfig, QueueSnapshot, RunSummary, Scheduler,
    SchedulerSettings, WorkItem,
};
use crate::storage::{FileArtifactStore, HttpRemoteSync, JsonQueueStore};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default provider for generation.
const DEFAULT_PROVIDER: &str = OPENROUTER;

/// Default model for generation.
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Batch generator for AI-written study notes.
#[derive(Parser)]
#[command(name = "note-forge")]
#[command(about = "Generate study notes from a queue of topics")]
#[command(version)]
#[command(
    long_about = "note-forge walks a queue of topics through outline drafting and note generation.\n\nOutlines can be reviewed and edited before the full note is written.\n\nExample usage:\n  note-forge add \"Photosynthesis\" \"The Krebs cycle\"\n  note-forge run --model openai/gpt-4o-mini\n  note-forge status"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Queue file (overrides NOTE_FORGE_STATE_FILE).
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Artifact directory (overrides NOTE_FORGE_ARTIFACT_PATH).
    #[arg(long, global = true)]
    pub artifacts: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Append topics to the queue.
    Add(AddArgs),

    /// Show the queue.
    #[command(alias = "ls")]
    Status(StatusArgs),

    /// Approve an outline waiting for review.
    Approve(ApproveArgs),

    /// Replace an outline and approve it.
    Edit(EditArgs),

    /// Process the queue until nothing is actionable.
    Run(Box<RunArgs>),

    /// List or print stored notes.
    Artifacts(ArtifactsArgs),
}

/// Arguments for `note-forge add`.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Topics to add.
    pub topics: Vec<String>,

    /// File with one topic per line. Blank lines and lines starting with '#' are skipped.
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Arguments for `note-forge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `note-forge approve`.
#[derive(Parser, Debug)]
pub struct ApproveArgs {
    /// Item id or unique id prefix.
    pub id: String,
}

/// Arguments for `note-forge edit`.
#[derive(Parser, Debug)]
pub struct EditArgs {
    /// Item id or unique id prefix.
    pub id: String,

    /// File holding the new outline.
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Arguments for `note-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML pipeline config. Flags below are ignored when set.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Provider for the content phase.
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    /// Model for the content phase.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Provider for the structure phase (defaults to --provider).
    #[arg(long)]
    pub structure_provider: Option<String>,

    /// Model for the structure phase (defaults to --model).
    #[arg(long)]
    pub structure_model: Option<String>,

    /// Skip the review gate.
    #[arg(long)]
    pub auto_approve: bool,

    /// Extra instructions added to every prompt.
    #[arg(long)]
    pub customization: Option<String>,

    /// Artifact collection.
    #[arg(long)]
    pub collection: Option<String>,

    /// Resume errored items at the content phase when an outline is cached.
    #[arg(long)]
    pub resume_at_content: bool,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,

    /// OpenRouter API key.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl RunArgs {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        if let Some(ref path) = self.config {
            return PipelineConfig::from_yaml_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e));
        }

        let mut config =
            PipelineConfig::new(ProviderConfig::new(&self.provider, &self.model))
                .with_auto_approve(self.auto_approve);
        if self.structure_provider.is_some() || self.structure_model.is_some() {
            config = config.with_structure_provider(ProviderConfig::new(
                self.structure_provider.as_deref().unwrap_or(&self.provider),
                self.structure_model.as_deref().unwrap_or(&self.model),
            ));
        }
        if let Some(ref text) = self.customization {
            config = config.with_prompt_customization(text);
        }
        if let Some(ref collection) = self.collection {
            config = config.with_collection(collection);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for `note-forge artifacts`.
#[derive(Parser, Debug)]
pub struct ArtifactsArgs {
    /// Collection to list.
    #[arg(long, default_value = crate::pipeline::DEFAULT_COLLECTION)]
    pub collection: String,

    /// Print the note for this item id or id prefix.
    #[arg(long)]
    pub show: Option<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut settings = SchedulerSettings::from_env()?;
    if let Some(path) = cli.state_file {
        settings = settings.with_state_file(path);
    }
    if let Some(path) = cli.artifacts {
        settings = settings.with_artifact_path(path);
    }

    match cli.command {
        Commands::Add(args) => run_add_command(settings, args).await,
        Commands::Status(args) => run_status_command(settings, args).await,
        Commands::Approve(args) => run_approve_command(settings, args).await,
        Commands::Edit(args) => run_edit_command(settings, args).await,
        Commands::Run(args) => run_pipeline_command(settings, *args).await,
        Commands::Artifacts(args) => run_artifacts_command(settings, args).await,
    }
}

// ============================================================================
// Scheduler construction
// ============================================================================

fn build_scheduler(
    settings: SchedulerSettings,
    registry: ProviderRegistry,
) -> anyhow::Result<Scheduler> {
    let generator = Arc::new(LlmNoteGenerator::new(registry));

    let mut artifacts = FileArtifactStore::new(&settings.artifact_path);
    if let Some(ref url) = settings.remote_sync_url {
        let remote = HttpRemoteSync::new(url)?;
        info!(url = %remote.url(), "Remote sync enabled");
        artifacts = artifacts.with_remote(remote);
    }
    let queue = JsonQueueStore::new(&settings.state_file);

    let scheduler = Scheduler::builder(settings)
        .structure_generator(generator.clone())
        .content_generator(generator)
        .artifact_store(Arc::new(artifacts))
        .queue_store(Arc::new(queue))
        .build()?;
    Ok(scheduler)
}

/// Scheduler for commands that never call a provider.
async fn open_queue(settings: SchedulerSettings) -> anyhow::Result<Scheduler> {
    let scheduler = build_scheduler(settings, ProviderRegistry::new())?;
    scheduler.restore().await?;
    Ok(scheduler)
}

fn build_registry(api_key: Option<String>) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::from_env()?;
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        registry.register(OPENROUTER, Arc::new(OpenRouterProvider::new(key)?));
    }
    Ok(registry)
}

/// Resolves a full id or a unique id prefix.
fn resolve_item_id(snapshot: &QueueSnapshot, needle: &str) -> anyhow::Result<String> {
    if snapshot.item(needle).is_some() {
        return Ok(needle.to_string());
    }
    let matches: Vec<&WorkItem> = snapshot
        .items
        .iter()
        .filter(|item| item.id.starts_with(needle))
        .collect();
    match matches.as_slice() {
        [item] => Ok(item.id.clone()),
        [] => Err(anyhow::anyhow!("No item matches '{}'", needle)),
        _ => Err(anyhow::anyhow!(
            "'{}' is ambiguous ({} items match)",
            needle,
            matches.len()
        )),
    }
}

// ============================================================================
// Queue commands
// ============================================================================

async fn run_add_command(settings: SchedulerSettings, args: AddArgs) -> anyhow::Result<()> {
    let mut topics = args.topics;
    if let Some(ref path) = args.file {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        topics.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    if topics.is_empty() {
        return Err(anyhow::anyhow!("No topics given"));
    }

    let scheduler = open_queue(settings).await?;
    let ids = scheduler.enqueue_topics(topics).await?;
    println!("Added {} topic(s)", ids.len());
    for id in ids {
        println!("  {}", id);
    }
    Ok(())
}

async fn run_status_command(settings: SchedulerSettings, args: StatusArgs) -> anyhow::Result<()> {
    let scheduler = open_queue(settings).await?;
    let snapshot = scheduler.snapshot().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_queue(&snapshot);
    Ok(())
}

fn print_queue(snapshot: &QueueSnapshot) {
    println!("Status: {}", snapshot.status_label);
    if snapshot.items.is_empty() {
        println!("Queue is empty");
        return;
    }
    println!();
    println!("{:<10} {:<18} {:>7}  TOPIC", "ID", "STATUS", "RETRIES");
    for item in &snapshot.items {
        let short_id: String = item.id.chars().take(8).collect();
        println!(
            "{:<10} {:<18} {:>7}  {}",
            short_id,
            item.status.as_str(),
            item.retry_count,
            item.topic
        );
        if let Some(ref message) = item.error_msg {
            if item.status == ItemStatus::Error {
                println!("{:<10} error: {}", "", message);
            }
        }
    }
    println!();
    let summary: Vec<String> = snapshot
        .counts()
        .iter()
        .map(|(status, count)| format!("{}={}", status, count))
        .collect();
    println!("Totals: {}", summary.join(" "));
}

async fn run_approve_command(settings: SchedulerSettings, args: ApproveArgs) -> anyhow::Result<()> {
    let scheduler = open_queue(settings).await?;
    let snapshot = scheduler.snapshot().await;
    let id = resolve_item_id(&snapshot, &args.id)?;

    if let Some(item) = snapshot.item(&id) {
        if item.status != ItemStatus::PausedForReview {
            warn!(item_id = %id, status = %item.status, "Item is not waiting for review");
        }
    }
    scheduler.approve_item(&id).await?;
    println!("Approved {}", id);
    Ok(())
}

async fn run_edit_command(settings: SchedulerSettings, args: EditArgs) -> anyhow::Result<()> {
    let structure = fs::read_to_string(&args.file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.file.display(), e))?;

    let scheduler = open_queue(settings).await?;
    let snapshot = scheduler.snapshot().await;
    let id = resolve_item_id(&snapshot, &args.id)?;
    scheduler.update_item_structure(&id, structure).await?;
    println!("Updated and approved {}", id);
    Ok(())
}

// ============================================================================
// Run command
// ============================================================================

async fn run_pipeline_command(
    mut settings: SchedulerSettings,
    args: RunArgs,
) -> anyhow::Result<()> {
    let config = args.pipeline_config()?;
    if args.resume_at_content {
        settings = settings.with_resume_errored_at_content(true);
    }

    let registry = build_registry(args.api_key.clone())?;
    for provider in [config.structure_provider(), config.content_provider()] {
        if !registry.contains(&provider.provider) {
            return Err(anyhow::anyhow!(
                "Provider '{}' is not configured. Set OPENROUTER_API_KEY (or --api-key) for openrouter, or LITELLM_API_BASE for litellm.",
                provider.provider
            ));
        }
    }

    if args.metrics {
        init_metrics()?;
    }

    let scheduler = build_scheduler(settings, registry)?;
    let loaded = scheduler.restore().await?;
    info!(items = loaded, "Queue loaded");

    let mut subscription = scheduler.subscribe();
    let runner = scheduler.clone();
    let mut handle = tokio::spawn(async move { runner.start_processing(config).await });

    let mut last_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut stop_requested = false;
    let summary: RunSummary = loop {
        tokio::select! {
            joined = &mut handle => {
                break joined??;
            }
            Some(snapshot) = subscription.recv() => {
                let counts = snapshot.counts();
                if counts != last_counts {
                    info!(label = %snapshot.status_label, counts = ?counts, "Queue updated");
                    last_counts = counts;
                } else {
                    debug!(label = %snapshot.status_label, "Queue updated");
                }
            }
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                signal?;
                warn!("Interrupt received, stopping after the current step");
                scheduler.stop().await?;
                stop_requested = true;
            }
        }
    };

    let snapshot = scheduler.snapshot().await;
    println!();
    println!(
        "Run finished ({}): {} processed, {} done, {} awaiting review, {} failed",
        summary.stop_reason, summary.processed, summary.completed, summary.paused, summary.failed
    );
    print_queue(&snapshot);

    if snapshot.circuit_open {
        println!();
        println!("The circuit breaker opened. Fix the provider issue and run again.");
    }

    if args.metrics {
        println!();
        print!("{}", export_metrics());
    }
    Ok(())
}

// ============================================================================
// Artifacts command
// ============================================================================

async fn run_artifacts_command(
    settings: SchedulerSettings,
    args: ArtifactsArgs,
) -> anyhow::Result<()> {
    let store = FileArtifactStore::new(&settings.artifact_path);
    let metas = store.list(&args.collection).await?;

    if let Some(ref needle) = args.show {
        let meta = metas
            .iter()
            .rev()
            .find(|meta| meta.item_id.starts_with(needle.as_str()))
            .ok_or_else(|| anyhow::anyhow!("No note for item '{}'", needle))?;
        print!("{}", store.read_content(meta).await?);
        return Ok(());
    }

    if metas.is_empty() {
        println!("No notes in collection '{}'", args.collection);
        return Ok(());
    }
    for meta in &metas {
        let short_id: String = meta.item_id.chars().take(8).collect();
        println!(
            "{}  {}  {:>7} B  {}  ({})",
            meta.created_at.format("%Y-%m-%d %H:%M"),
            short_id,
            meta.size_bytes,
            meta.topic,
            meta.provenance.content_provider
        );
    }
    Ok(())
}
