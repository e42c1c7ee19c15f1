mod config;
mod report;
mod review;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;

use proposer_agent::{create_backend, Backend, BackendConfig, BackendType, StaticRetriever};
use proposer_core::{
    CheckpointStore, FileCheckpointStore, GenerationUnit, ReviewAction, ReviewFeedback,
    RevisionUnit, WorkflowRunner, WorkflowState,
};
use proposer_critic::{Dimension, EvaluationAggregator, EvaluationAmendment};
use proposer_logging::{init_tracing, LogFormat, Logger, SessionWriter};

use crate::config::{load_request, ProjectConfig, RoleKind};

#[derive(Parser, Debug)]
#[command(
    name = "proposer",
    about = "Generate a proposal and refine it against a panel of critics",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG overrides)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Also write diagnostic logs (proposer.log) and run events (events.jsonl) to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new refinement run
    Run(RunArgs),
    /// Continue a suspended or interrupted run
    Resume(ResumeArgs),
    /// List the available critique dimensions
    Dimensions,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Backend for every role (overrides proposer.toml)
    #[arg(short, long, value_enum)]
    backend: Option<BackendChoice>,

    /// Model for every role (if the backend supports it)
    #[arg(short, long)]
    model: Option<String>,

    /// JSON file of reference material offered to generation and revision
    #[arg(long)]
    references: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Request file (.toml or .json)
    #[arg(short, long, default_value = "request.toml")]
    request: PathBuf,

    /// Critique dimension; repeat for several (default: from proposer.toml, else logic, completeness, feasibility)
    #[arg(long = "dimension")]
    dimensions: Vec<String>,

    /// Maximum number of proposal versions
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Overall score (0-10) at which the run completes
    #[arg(long)]
    excellent_score: Option<f64>,

    /// Pause for reviewer input after every evaluation
    #[arg(long)]
    review: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    /// Checkpoint token (prompted for when omitted on a terminal)
    token: Option<String>,

    /// Override the automatic continue/stop decision
    #[arg(long, value_enum)]
    action: Option<ActionChoice>,

    /// Replacement overall score (0-10) for the latest evaluation
    #[arg(long)]
    score: Option<f64>,

    /// Reviewer feedback added to the latest evaluation
    #[arg(long)]
    feedback: Option<String>,

    /// Reviewer suggestion; repeat for several
    #[arg(long = "suggest")]
    suggestions: Vec<String>,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendChoice {
    Claude,
    Opencode,
}

impl From<BackendChoice> for BackendType {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Claude => BackendType::Claude,
            BackendChoice::Opencode => BackendType::OpenCode,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActionChoice {
    Continue,
    Stop,
}

impl From<ActionChoice> for ReviewAction {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::Continue => ReviewAction::Continue,
            ActionChoice::Stop => ReviewAction::Stop,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    let guard = init_tracing(&cli.log_level, log_format, cli.log_dir.as_deref());

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = ProjectConfig::load(&working_dir)?.unwrap_or_default();
    let logger = Arc::new(
        Logger::for_log_dir(log_format, cli.log_dir.as_deref())
            .context("Failed to open event log")?,
    );

    let code = match cli.command {
        Command::Run(args) => run(args, &config, &working_dir, logger).await?,
        Command::Resume(args) => resume(args, &config, &working_dir, logger).await?,
        Command::Dimensions => {
            print_dimensions(&config);
            0
        }
    };

    // flush file logs before exiting
    drop(guard);
    std::process::exit(code);
}

async fn run(
    args: RunArgs,
    config: &ProjectConfig,
    working_dir: &Path,
    logger: Arc<Logger>,
) -> Result<i32> {
    let request_path = resolve(working_dir, &args.request);
    let request = load_request(&request_path)?;

    let mut settings = config.settings();
    if let Some(max) = args.max_iterations {
        settings.max_iterations = max;
    }
    if let Some(score) = args.excellent_score {
        settings.excellent_score = score;
    }
    settings.human_review = args.review;

    let dimensions = if args.dimensions.is_empty() {
        configured_dimensions(config)
    } else {
        args.dimensions.clone()
    };

    if args.dry_run {
        println!("=== Dry Run ===");
        println!("Request: {}", request_path.display());
        println!("Problem: {}", report::preview(&request.problem, 100));
        println!("Goals: {}", request.goals.len());
        println!("Constraints: {}", request.constraints.len());
        for role in [RoleKind::Generation, RoleKind::Critique, RoleKind::Revision] {
            println!(
                "{:?}: {}",
                role,
                resolve_backend(&args.backend, config, role)?
            );
        }
        println!("Dimensions: {}", dimensions.join(", "));
        println!("Max iterations: {}", settings.max_iterations);
        println!("Excellent score: {:.1}", settings.excellent_score);
        println!("Human review: {}", settings.human_review);
        return Ok(0);
    }

    let store = Arc::new(FileCheckpointStore::default_location()?);
    let runner = build_runner(
        &args.backend,
        config,
        working_dir,
        &dimensions,
        store,
        logger,
    )
    .await?;
    install_interrupt_handler(&runner)?;

    let outcome = runner.run(request, settings).await?;

    let interactive = std::io::stdin().is_terminal() && !args.backend.json_output;
    let outcome = review::review_loop(&runner, outcome, interactive).await?;
    report::emit(&outcome, args.backend.json_output)?;
    Ok(outcome.exit_code())
}

async fn resume(
    args: ResumeArgs,
    config: &ProjectConfig,
    working_dir: &Path,
    logger: Arc<Logger>,
) -> Result<i32> {
    let store = Arc::new(FileCheckpointStore::default_location()?);
    let token = match args.token.clone() {
        Some(token) => token,
        None if std::io::stdin().is_terminal() => review::pick_checkpoint(&store)?,
        None => anyhow::bail!("No checkpoint token given"),
    };

    let state = store
        .load(&token)
        .with_context(|| format!("Failed to load checkpoint {}", token))?;
    let dimensions = run_dimensions(&state).unwrap_or_else(|| configured_dimensions(config));

    let runner = build_runner(
        &args.backend,
        config,
        working_dir,
        &dimensions,
        store,
        logger,
    )
    .await?;
    install_interrupt_handler(&runner)?;

    let feedback = ReviewFeedback {
        amendment: amendment_from_args(&args),
        action: args.action.map(Into::into),
    };
    let outcome = runner.resume(&token, feedback).await?;

    let interactive = std::io::stdin().is_terminal() && !args.backend.json_output;
    let outcome = review::review_loop(&runner, outcome, interactive).await?;
    report::emit(&outcome, args.backend.json_output)?;
    Ok(outcome.exit_code())
}

async fn build_runner(
    args: &BackendArgs,
    config: &ProjectConfig,
    working_dir: &Path,
    dimensions: &[String],
    store: Arc<FileCheckpointStore>,
    logger: Arc<Logger>,
) -> Result<WorkflowRunner> {
    let generation = role_backend(args, config, RoleKind::Generation).await?;
    let critique = role_backend(args, config, RoleKind::Critique).await?;
    let revision = role_backend(args, config, RoleKind::Revision).await?;

    let backend_config = |role| {
        let mut backend_config = BackendConfig::new().with_working_dir(working_dir.to_path_buf());
        if let Some(model) = args.model.as_deref().or(config.model_for(role)) {
            backend_config = backend_config.with_model(model);
        }
        backend_config
    };

    let aggregator = EvaluationAggregator::new(
        critique,
        dimensions,
        backend_config(RoleKind::Critique),
    )
    .context("Invalid critique dimensions")?;

    let mut runner = WorkflowRunner::new(
        GenerationUnit::new(generation, backend_config(RoleKind::Generation)),
        aggregator,
        RevisionUnit::new(revision, backend_config(RoleKind::Revision)),
        logger,
    )
    .with_checkpoints(store as Arc<dyn CheckpointStore>);

    if let Some(path) = &args.references {
        let retriever = StaticRetriever::from_file(&resolve(working_dir, path))
            .with_context(|| format!("Failed to load references from {}", path.display()))?;
        runner = runner.with_retriever(Arc::new(retriever));
    }

    match SessionWriter::default_dir() {
        Ok(dir) => runner = runner.with_session_dir(dir),
        Err(e) => warn!(error = %e, "Session transcript disabled"),
    }

    Ok(runner)
}

fn resolve_backend(args: &BackendArgs, config: &ProjectConfig, role: RoleKind) -> Result<BackendType> {
    if let Some(choice) = args.backend {
        return Ok(choice.into());
    }
    match config.backend_for(role) {
        Some(name) => name
            .parse::<BackendType>()
            .map_err(|e| anyhow::anyhow!("{} in {}", e, config::CONFIG_FILE_NAME)),
        None => Ok(BackendType::Claude),
    }
}

async fn role_backend(
    args: &BackendArgs,
    config: &ProjectConfig,
    role: RoleKind,
) -> Result<Arc<dyn Backend>> {
    let backend = create_backend(resolve_backend(args, config, role)?);
    if !backend.is_available().await {
        anyhow::bail!(
            "{:?} backend '{}' is not available. Make sure it's installed and in PATH.",
            role,
            backend.name()
        );
    }
    Ok(backend)
}

fn install_interrupt_handler(runner: &WorkflowRunner) -> Result<()> {
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping after the current step...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")
}

fn configured_dimensions(config: &ProjectConfig) -> Vec<String> {
    match &config.workflow.dimensions {
        Some(dimensions) => dimensions.clone(),
        None => Dimension::DEFAULT_SET
            .iter()
            .map(|d| d.as_str().to_string())
            .collect(),
    }
}

/// Dimensions a checkpointed run was evaluated on, if it got that far
fn run_dimensions(state: &WorkflowState) -> Option<Vec<String>> {
    state.evaluations().last().map(|evaluation| {
        evaluation
            .dimensions
            .iter()
            .map(|r| r.dimension.as_str().to_string())
            .collect()
    })
}

fn amendment_from_args(args: &ResumeArgs) -> Option<EvaluationAmendment> {
    let amendment = EvaluationAmendment {
        overall_score: args.score,
        feedback: args.feedback.clone(),
        suggestions: args.suggestions.clone(),
    };
    (!amendment.is_empty()).then_some(amendment)
}

fn print_dimensions(config: &ProjectConfig) {
    let configured = configured_dimensions(config);
    for dimension in Dimension::ALL {
        let selected = configured
            .iter()
            .any(|d| d.parse::<Dimension>() == Ok(dimension));
        let marker = if selected { "*" } else { " " };
        println!("{} {:<13} {}", marker, dimension.as_str(), dimension.focus());
    }
}

fn resolve(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
