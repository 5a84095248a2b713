//! CLI binary for running and inspecting HANA scaffolding pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use hana_pipeline::{
    checkpoint_saved_at, clear_checkpoint, default_registry, load_checkpoint, status_path,
    validate, Answer, Completion, ConsoleInterviewer, Interviewer, LintContext,
    PipelineExecutor, ProjectConfig, RecordingInterviewer, Severity,
};
use hana_tools::{DryRunRunner, ToolLocator};
use hana_types::status::{LOOP_CURSORS_KEY, RESERVED_KEYS};
use hana_types::LastOp;

#[derive(Parser)]
#[command(name = "hana", version, about = "Resumable runner for HANA scaffolding pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline in a project directory, resuming from its checkpoint
    Run {
        /// Directory holding hana_config.json
        project: PathBuf,

        /// Print every command without executing anything or saving progress
        #[arg(long)]
        dry_run: bool,

        /// Restart without asking if the pipeline already completed
        #[arg(short = 'f', long)]
        restart: bool,
    },

    /// Check the configured operations without running them
    Validate {
        /// Directory holding hana_config.json
        project: PathBuf,
    },

    /// Show the saved checkpoint
    Status {
        /// Directory holding hana_status.json
        project: PathBuf,
    },

    /// Remove the checkpoint so the next run starts from the first operation
    Reset {
        /// Directory holding hana_status.json
        project: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            project,
            dry_run,
            restart,
        } => {
            cmd_run(&project, dry_run, restart).await?;
        }
        Commands::Validate { project } => {
            cmd_validate(&project).await?;
        }
        Commands::Status { project } => {
            cmd_status(&project).await?;
        }
        Commands::Reset { project } => {
            cmd_reset(&project).await?;
        }
    }

    Ok(())
}

fn load_project(project: &Path) -> anyhow::Result<(ProjectConfig, ToolLocator)> {
    let config = ProjectConfig::load(project)?;
    let tools = config.tool_locator(ToolLocator::from_env());
    Ok((config, tools))
}

async fn cmd_run(project: &Path, dry_run: bool, restart: bool) -> anyhow::Result<()> {
    let (config, tools) = load_project(project)?;

    println!("Project: {}", config.project_path.display());
    println!("Operations: {}", config.ops.len());
    if dry_run {
        println!("(dry run mode -- nothing is executed or saved)");
    }

    let interviewer: Arc<dyn Interviewer> = if restart {
        Arc::new(RecordingInterviewer::new(vec![Answer::new("y")]))
    } else {
        Arc::new(ConsoleInterviewer)
    };
    let planner = Arc::new(DryRunRunner::new());
    let mut executor = PipelineExecutor::with_default_registry().with_interviewer(interviewer);
    if dry_run {
        executor = executor.with_dry_run(planner.clone());
    }

    let result = executor.run(&config, &tools).await?;

    match result.completion {
        Completion::AlreadyComplete => println!("Pipeline already complete"),
        Completion::Finished => {
            println!("\nPipeline completed");
            println!("Executed operations: {}", result.executed.len());
        }
    }
    if dry_run {
        println!("\nPlanned commands:");
        for chain in planner.planned() {
            println!("  {chain}");
        }
    }

    Ok(())
}

async fn cmd_validate(project: &Path) -> anyhow::Result<()> {
    let (config, tools) = load_project(project)?;
    let initial = config.initial_status(&tools);

    // Validate against what a run would actually start from.
    let mut status = load_checkpoint(&config.project_path).await;
    status.merge(&initial);
    let status = match status.last_op() {
        LastOp::At(path) if !path.is_empty() && config.is_resumable(&path) => {
            println!("Checking from checkpoint position {path}");
            status
        }
        _ => initial,
    };

    let registry = default_registry();
    let diagnostics = validate(&LintContext {
        config: &config,
        status: &status,
        registry: &registry,
    });

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_status(project: &Path) -> anyhow::Result<()> {
    if !status_path(project).is_file() {
        println!("No checkpoint in {}", project.display());
        return Ok(());
    }
    let status = load_checkpoint(project).await;

    match status.last_op() {
        LastOp::Missing => println!("Last operation: (none)"),
        LastOp::Corrupted(value) => println!("Last operation: {value} (unreadable)"),
        LastOp::At(path) if path.is_empty() => println!("Last operation: [] (pipeline complete)"),
        LastOp::At(path) => println!("Last operation: {path}"),
    }
    if let Some(saved_at) = checkpoint_saved_at(project).await {
        println!("Saved at: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    println!("\nStatus:");
    for key in status.keys() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = status.get(key).cloned().unwrap_or_default();
        println!("  {key} = {value}");
    }
    if let Some(cursors) = status.get(LOOP_CURSORS_KEY) {
        println!("\nLoops in progress: {cursors}");
    }

    Ok(())
}

async fn cmd_reset(project: &Path) -> anyhow::Result<()> {
    clear_checkpoint(project).await?;
    println!("Checkpoint removed; the next run starts from the first operation");
    Ok(())
}
