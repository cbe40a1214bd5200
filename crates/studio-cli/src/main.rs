mod export;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use studio_contracts::events::EventWriter;
use studio_contracts::presets::{PresetCatalog, StyleMode, SubjectCategory};
use studio_contracts::runs::{now_utc_iso, GenerationTask, RunResultSet, TaskStatus};
use studio_engine::{
    default_client_registry, load_source_image, timeout_from_secs, RunObserver, RunOutcome,
    RunReport, Runner, RunnerConfig, StudioConfig, CUSTOM_DISPLAY_NAME, DEFAULT_CLIENT,
};

use crate::export::export_results;
use crate::session::{run_session, SessionOptions};

#[derive(Debug, Parser)]
#[command(
    name = "portrait-studio",
    version,
    about = "Restyle a portrait across preset looks with an image-edit model"
)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Edit client: `gemini` or `dryrun`.
    #[arg(long, global = true, default_value = DEFAULT_CLIENT)]
    client: String,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    pacing_ms: Option<u64>,
    #[arg(long, global = true)]
    timeout_secs: Option<f64>,
    /// JSON catalog replacing the built-in presets.
    #[arg(long, global = true)]
    presets: Option<PathBuf>,
    /// Append run telemetry as JSONL.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the preset catalog.
    Presets(PresetsArgs),
    /// Generate every preset of one group for a portrait.
    Batch(BatchArgs),
    /// Apply one free-form edit to a portrait.
    Custom(CustomArgs),
    /// Interactive session.
    Session(SessionArgs),
}

#[derive(Debug, Parser)]
struct PresetsArgs {
    #[arg(long)]
    category: Option<SubjectCategory>,
    #[arg(long)]
    mode: Option<StyleMode>,
}

#[derive(Debug, Parser)]
struct BatchArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t)]
    category: SubjectCategory,
    #[arg(long, default_value_t)]
    mode: StyleMode,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CustomArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "portraits")]
    out: PathBuf,
    #[arg(long, default_value_t)]
    category: SubjectCategory,
    #[arg(long, default_value_t)]
    mode: StyleMode,
}

fn main() {
    env_logger::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("portrait-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = studio_config(&cli.engine);
    let catalog = PresetCatalog::load_or_builtin(config.presets_path.as_deref())
        .context("failed loading preset catalog")?;
    match cli.command {
        Command::Presets(args) => run_presets(&catalog, args),
        Command::Batch(args) => run_batch(&cli.engine, &config, &catalog, args),
        Command::Custom(args) => run_custom(&cli.engine, &config, args),
        Command::Session(args) => {
            let studio = Studio::new(&cli.engine, &config)?;
            run_session(
                studio,
                catalog,
                SessionOptions {
                    image: args.image,
                    out: args.out,
                    category: args.category,
                    mode: args.mode,
                },
            )?;
            Ok(0)
        }
    }
}

/// Environment first, then command-line overrides.
fn studio_config(args: &EngineArgs) -> StudioConfig {
    let mut config = StudioConfig::from_env();
    if let Some(model) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.image_model = model.to_string();
    }
    if let Some(ms) = args.pacing_ms {
        config.pacing_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = args.timeout_secs {
        match timeout_from_secs(secs) {
            Some(timeout) => config.request_timeout = Some(timeout),
            None => log::warn!("--timeout-secs {secs} is not a usable timeout; ignoring"),
        }
    }
    if let Some(path) = &args.presets {
        config.presets_path = Some(path.clone());
    }
    config
}

pub(crate) struct Studio {
    pub runner: Arc<Runner>,
    pub run_id: String,
    pub started_at: String,
}

impl Studio {
    fn new(args: &EngineArgs, config: &StudioConfig) -> Result<Self> {
        let registry = default_client_registry(config);
        let Some(client) = registry.get(&args.client) else {
            bail!(
                "unknown client '{}' (available: [{}])",
                args.client.trim(),
                registry.names().join(", ")
            );
        };
        if client.name() == "gemini" && config.api_key.is_none() {
            log::warn!("no Gemini API key configured; every edit will fail");
        }
        let run_id = format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
        let events = match &args.events {
            Some(path) => EventWriter::new(path, &run_id),
            None => EventWriter::disabled(&run_id),
        };
        let runner = Runner::new(client, RunnerConfig::from(config))
            .with_events(events)
            .with_observer(Arc::new(ConsoleObserver));
        let runner = Arc::new(runner);
        Ok(Self {
            runner,
            run_id,
            started_at: now_utc_iso(),
        })
    }
}

/// Prints one line per finished task.
pub(crate) struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn task_updated(&self, task: &GenerationTask) {
        match &task.status {
            TaskStatus::Pending => {}
            TaskStatus::Succeeded { .. } => println!("  ok    {}", task.display_name),
            TaskStatus::Failed { message } => {
                println!("  fail  {}: {message}", task.display_name)
            }
        }
    }
}

fn run_presets(catalog: &PresetCatalog, args: PresetsArgs) -> Result<i32> {
    let mut shown = 0;
    for group in catalog.groups() {
        if args.category.is_some_and(|category| category != group.category)
            || args.mode.is_some_and(|mode| mode != group.mode)
        {
            continue;
        }
        println!(
            "{} / {} ({})",
            group.category,
            group.mode,
            group.mode.batch_label()
        );
        for (index, preset) in group.presets.iter().enumerate() {
            println!("  {:>2}. {:<24} {}", index + 1, preset.display_name, preset.id);
        }
        shown += 1;
    }
    if shown == 0 {
        println!("No presets match.");
    }
    Ok(0)
}

fn run_batch(
    engine: &EngineArgs,
    config: &StudioConfig,
    catalog: &PresetCatalog,
    args: BatchArgs,
) -> Result<i32> {
    let source = load_source_image(&args.image)
        .with_context(|| format!("failed loading source image {}", args.image.display()))?;
    let presets = catalog.presets(args.category, args.mode);
    if presets.is_empty() {
        log::warn!("no presets for {} / {}", args.category, args.mode);
    }
    let studio = Studio::new(engine, config)?;
    println!(
        "Generating {} {} for {} via {}",
        presets.len(),
        args.mode.batch_label(),
        args.category,
        studio.runner.client_name()
    );

    let outcome = studio.runner.run_batch(Some(&source), presets);
    finish(&studio, outcome, args.out.as_deref())
}

fn run_custom(engine: &EngineArgs, config: &StudioConfig, args: CustomArgs) -> Result<i32> {
    let source = load_source_image(&args.image)
        .with_context(|| format!("failed loading source image {}", args.image.display()))?;
    let studio = Studio::new(engine, config)?;
    let outcome = studio
        .runner
        .run_one(Some(&source), &args.prompt, CUSTOM_DISPLAY_NAME);
    finish(&studio, outcome, args.out.as_deref())
}

/// Prints the run tally, exports when asked, and maps the outcome to an exit
/// code: 0 when every task succeeded, 2 otherwise.
fn finish(studio: &Studio, outcome: RunOutcome, out: Option<&Path>) -> Result<i32> {
    let report = match outcome {
        RunOutcome::Declined(reason) => bail!("run declined: {reason}"),
        RunOutcome::Finished(report) => report,
    };
    print_report(&report);

    let results = studio.runner.results();
    if let Some(out_dir) = out {
        export_into(studio, &results, out_dir, report.cancelled > 0)?;
    }
    Ok(if report.failed == 0 && report.cancelled == 0 {
        0
    } else {
        2
    })
}

pub(crate) fn print_report(report: &RunReport) {
    let mut line = format!(
        "{} run finished in {:.1}s: {} succeeded, {} failed",
        report.kind.as_str(),
        report.elapsed.as_secs_f64(),
        report.succeeded,
        report.failed
    );
    if report.cancelled > 0 {
        line.push_str(&format!(", {} cancelled", report.cancelled));
    }
    println!("{line}");
}

pub(crate) fn export_into(
    studio: &Studio,
    results: &RunResultSet,
    out_dir: &Path,
    cancelled: bool,
) -> Result<()> {
    let report = export_results(
        results,
        out_dir,
        &studio.run_id,
        &studio.started_at,
        studio.runner.client_name(),
        cancelled,
    )?;
    println!(
        "Saved {} image(s) to {} (summary: {})",
        report.written.len(),
        out_dir.display(),
        report.summary_path.display()
    );
    Ok(())
}
