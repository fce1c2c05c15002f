//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use curricula_core::{HarmonizeProgress, SyncProgress};
use curricula_judge::{ChatJudge, ChatJudgeOptions};
use curricula_objects::FsObjectStore;
use curricula_shared::{
    AppConfig, ConceptId, HarmonizeConfig, OrphanPolicy, expand_home, init_config, load_config,
    validate_judge_config,
};
use curricula_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Curricula: harmonize training concepts across business units.
#[derive(Parser)]
#[command(
    name = "curricula",
    version,
    about = "Harmonize training concepts into a canonical curriculum graph.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Propose synonym clusters and align concepts to canonical concepts.
    Harmonize {
        /// Print proposed clusters without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Re-judge concepts that are already aligned.
        #[arg(long)]
        include_aligned: bool,

        /// Concepts per judge call.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Judge calls in flight at once.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Rebuild course and slide nodes from the object store.
    Sync {
        /// What to do with nodes whose artifacts are gone: flag or remove.
        #[arg(long)]
        orphans: Option<OrphanPolicy>,

        /// Object-store root directory (overrides config).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Concept node management.
    Concepts {
        #[command(subcommand)]
        action: ConceptsAction,
    },

    /// Canonical concept inspection.
    Canon {
        #[command(subcommand)]
        action: CanonAction,
    },

    /// Show graph counts and recent runs.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Concept subcommands.
#[derive(Subcommand)]
pub(crate) enum ConceptsAction {
    /// Bulk-create concepts from a JSON array of {name, description, business_unit}.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// List concepts.
    List {
        /// Only concepts with no canonical alignment.
        #[arg(long)]
        unaligned: bool,
    },
}

/// Canonical concept subcommands.
#[derive(Subcommand)]
pub(crate) enum CanonAction {
    /// List canonical concepts with their aligned concepts.
    List,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "curricula=info",
        1 => "curricula=debug",
        _ => "curricula=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Harmonize {
            dry_run,
            include_aligned,
            batch_size,
            concurrency,
        } => cmd_harmonize(dry_run, include_aligned, batch_size, concurrency).await,
        Command::Sync { orphans, root } => cmd_sync(orphans, root).await,
        Command::Concepts { action } => match action {
            ConceptsAction::Import { file } => cmd_concepts_import(&file).await,
            ConceptsAction::List { unaligned } => cmd_concepts_list(unaligned).await,
        },
        Command::Canon { action } => match action {
            CanonAction::List => cmd_canon_list().await,
        },
        Command::Status => cmd_status().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn database_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(expand_home(&config.storage.database_path)?)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(&database_path(config)?).await?)
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open_readonly(&database_path(config)?).await?)
}

// ---------------------------------------------------------------------------
// harmonize
// ---------------------------------------------------------------------------

async fn cmd_harmonize(
    dry_run: bool,
    include_aligned: bool,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_judge_config(&config)?;

    let mut harmonize_config = HarmonizeConfig::from(&config);
    if let Some(n) = batch_size {
        harmonize_config.batch_size = n;
    }
    if let Some(n) = concurrency {
        harmonize_config.concurrency = n;
    }
    harmonize_config.include_aligned |= include_aligned;
    harmonize_config.validate()?;

    let judge = ChatJudge::new(ChatJudgeOptions {
        base_url: config.judge.base_url.clone(),
        model: config.judge.model.clone(),
        api_key,
        temperature: config.judge.temperature,
        timeout: harmonize_config.judge_timeout,
    })?;

    let storage = open_storage(&config).await?;
    info!(
        model = %config.judge.model,
        batch_size = harmonize_config.batch_size,
        concurrency = harmonize_config.concurrency,
        dry_run,
        "harmonizing concepts"
    );

    let run_id = if dry_run {
        None
    } else {
        Some(storage.insert_run("harmonize").await?)
    };

    let reporter = CliProgress::new();
    let report = curricula_core::harmonize(
        &storage,
        Arc::new(judge),
        &harmonize_config,
        &reporter,
    )
    .await?;
    reporter.finish();

    let names: HashMap<ConceptId, String> = storage
        .list_concepts(false)
        .await?
        .into_iter()
        .map(|c| (c.id, format!("{} ({})", c.name, c.business_unit)))
        .collect();

    println!();
    println!("  Proposed clusters: {}", report.clusters.len());
    for (i, cluster) in report.clusters.iter().enumerate() {
        println!("  [{i}] {}", cluster.canonical_name);
        for member in &cluster.source_concepts {
            let label = names.get(member).map(String::as_str).unwrap_or("?");
            println!("        - {label}");
        }
    }
    if !report.duplicate_names.is_empty() {
        println!();
        println!("  Names proposed in more than one batch (not merged):");
        for dup in &report.duplicate_names {
            println!("    {} -> clusters {:?}", dup.canonical_name, dup.cluster_indices);
        }
    }
    println!();
    println!("  Concepts:   {}", report.concepts_considered);
    println!(
        "  Batches:    {} ({} skipped)",
        report.batches_total,
        report.batches_skipped.len()
    );
    for skipped in &report.batches_skipped {
        println!("    batch {} ({} concepts): {}", skipped.index, skipped.size, skipped.reason);
    }
    println!("  Singletons: {}", report.singletons_dropped);
    println!("  Dropped member refs: {}", report.members_dropped);

    let Some(run_id) = run_id else {
        println!();
        println!("  Dry run: nothing written.");
        println!();
        return Ok(());
    };

    let reporter = CliProgress::new();
    let applied = curricula_core::apply_clusters(&storage, &report.clusters, &reporter).await;
    reporter.finish();
    let applied = applied?;

    println!();
    println!("  Applied:    {}", applied.clusters_applied);
    if applied.clusters_unchanged > 0 {
        println!("  Unchanged:  {} (members already aligned)", applied.clusters_unchanged);
    }
    println!(
        "  Canonicals: {} created, {} reused",
        applied.canonicals_created, applied.canonicals_reused
    );
    println!(
        "  Edges:      {} created, {} already aligned",
        applied.edges_created, applied.edges_already_present
    );
    for failed in &applied.failed {
        println!("  FAILED [{}] {}: {}", failed.index, failed.canonical_name, failed.reason);
    }
    println!();

    let stats = serde_json::json!({
        "model": config.judge.model,
        "concepts": report.concepts_considered,
        "batches": report.batches_total,
        "batches_skipped": report.batches_skipped,
        "clusters": report.clusters.len(),
        "singletons_dropped": report.singletons_dropped,
        "members_dropped": report.members_dropped,
        "duplicate_names": report.duplicate_names,
        "apply": applied,
    });
    storage.finish_run(&run_id, &stats.to_string()).await?;

    if !applied.failed.is_empty() {
        return Err(eyre!("{} cluster(s) failed to apply", applied.failed.len()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

async fn cmd_sync(orphans: Option<OrphanPolicy>, root: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let policy = orphans.unwrap_or(config.sync.orphan_policy);
    let root = match root {
        Some(r) => r,
        None => expand_home(&config.object_store.root)?,
    };

    let store = FsObjectStore::open(&root, &config.object_store.bucket)?;
    let storage = open_storage(&config).await?;
    info!(
        root = %root.display(),
        bucket = %config.object_store.bucket,
        %policy,
        "syncing course graph"
    );

    let run_id = storage.insert_run("sync").await?;
    let reporter = CliProgress::new();
    let report = curricula_core::sync_graph(&storage, &store, policy, &reporter).await?;
    reporter.finish();

    println!();
    println!("  Courses seen:     {}", report.courses_seen);
    println!("  Courses created:  {}", report.courses_created);
    println!("  Courses refreshed:{:>4}", report.courses_refreshed);
    println!("  Slides created:   {}", report.slides_created);
    println!("  Nodes flagged:    {}", report.nodes_flagged);
    println!("  Nodes removed:    {}", report.nodes_removed);
    println!("  Nodes restored:   {}", report.nodes_restored);
    for skipped in &report.skipped {
        println!("  SKIPPED {}: {}", skipped.course_id, skipped.reason);
    }
    println!();

    let mut stats = serde_json::to_value(&report)?;
    stats["policy"] = serde_json::Value::String(policy.to_string());
    storage.finish_run(&run_id, &stats.to_string()).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// concepts / canon / status
// ---------------------------------------------------------------------------

/// One entry of a `concepts import` file.
#[derive(Debug, Deserialize)]
struct ImportedConcept {
    name: String,
    #[serde(default)]
    description: String,
    business_unit: String,
}

async fn cmd_concepts_import(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let entries: Vec<ImportedConcept> = serde_json::from_str(&content)
        .map_err(|e| eyre!("'{}' is not a JSON array of concepts: {e}", file.display()))?;

    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let mut imported = 0usize;
    for entry in &entries {
        storage
            .upsert_concept(entry.name.trim(), entry.description.trim(), entry.business_unit.trim())
            .await?;
        imported += 1;
    }

    info!(imported, file = %file.display(), "concepts imported");
    println!("Imported {imported} concept(s).");
    Ok(())
}

async fn cmd_concepts_list(unaligned: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let concepts = storage.list_concepts(unaligned).await?;
    for c in &concepts {
        println!("{}  {:<40} {}", c.id, c.name, c.business_unit);
    }
    println!("{} concept(s)", concepts.len());
    Ok(())
}

async fn cmd_canon_list() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let canon = storage.list_canonicals().await?;
    for entry in &canon {
        println!("{}  ({} aligned)", entry.canonical.canonical_name, entry.members.len());
        if !entry.canonical.description.is_empty() {
            println!("    {}", entry.canonical.description);
        }
        for m in &entry.members {
            println!("    - {} ({})", m.name, m.business_unit);
        }
    }
    println!("{} canonical concept(s)", canon.len());
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let counts = storage.graph_counts().await?;
    println!();
    println!("  Concepts:   {} ({} unaligned)", counts.concepts, counts.unaligned_concepts);
    println!("  Canonicals: {}", counts.canonical_concepts);
    println!("  ALIGNS_TO:  {}", counts.alignments);
    println!("  Courses:    {}", counts.courses);
    println!("  Slides:     {}", counts.slides);
    println!("  Orphaned:   {}", counts.orphaned_nodes);

    let runs = storage.list_runs(5).await?;
    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        for run in &runs {
            let finished = run.finished_at.as_deref().unwrap_or("unfinished");
            println!("    {:<10} {}  {}", run.kind, run.started_at, finished);
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using indicatif spinners.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl HarmonizeProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Judging batches [{current}/{total}]"));
    }

    fn cluster_applied(&self, current: usize, total: usize, canonical_name: &str) {
        self.spinner
            .set_message(format!("Applying [{current}/{total}] {canonical_name}"));
    }
}

impl SyncProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn course_done(&self, current: usize, total: usize, course_id: &str) {
        self.spinner
            .set_message(format!("Reconciling [{current}/{total}] {course_id}"));
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
