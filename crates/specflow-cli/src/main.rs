mod cmd_approvals;
mod cmd_archive;
mod cmd_serve;
mod cmd_specs;
mod cmd_steering;
mod cmd_tasks;
mod cmd_watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use specflow::{SpecWorkflow, WorkflowPaths};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "specflow")]
#[command(about = "Inspect and drive spec-driven development workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root containing the workflow directory
    #[arg(long, global = true, default_value = ".", env = "SPECFLOW_PROJECT")]
    project: PathBuf,

    /// Workflow directory (default: <project>/.spec-workflow)
    #[arg(long, global = true)]
    workflow_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List specifications with document presence and task progress
    Specs {
        /// List archived specifications instead of active ones
        #[arg(long)]
        archived: bool,
    },
    /// Read and update task documents
    Tasks {
        #[command(subcommand)]
        op: cmd_tasks::TasksOp,
    },
    /// Review approval requests
    Approvals {
        #[command(subcommand)]
        op: cmd_approvals::ApprovalsOp,
    },
    /// Move a specification into the archive
    Archive { name: String },
    /// Move an archived specification back to the active root
    Unarchive { name: String },
    /// Report whether a specification is active, archived or missing
    Locate { name: String },
    /// Show steering document status, or print one steering document
    Steering {
        /// product, tech or structure
        kind: Option<String>,
    },
    /// Print classified changes to the workflow tree as they happen
    Watch,
    /// Serve the reviewer API and live push channel
    Serve {
        /// Port to listen on (overrides config.toml and SPECFLOW_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (overrides config.toml and SPECFLOW_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// What every subcommand needs.
pub struct Context {
    pub workflow: SpecWorkflow,
    pub json: bool,
}

impl Context {
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut paths = WorkflowPaths::new(cli.project);
    if let Some(dir) = cli.workflow_dir {
        paths = paths.with_workflow_dir(dir);
    }
    debug!(workflow_dir = %paths.workflow_dir().display(), "Resolved workflow directory");
    let ctx = Context {
        workflow: SpecWorkflow::new(paths),
        json: cli.json,
    };

    match cli.command {
        Commands::Specs { archived } => cmd_specs::run(&ctx, archived),
        Commands::Tasks { op } => cmd_tasks::run(&ctx, op),
        Commands::Approvals { op } => cmd_approvals::run(&ctx, op),
        Commands::Archive { name } => cmd_archive::archive(&ctx, &name),
        Commands::Unarchive { name } => cmd_archive::unarchive(&ctx, &name),
        Commands::Locate { name } => cmd_archive::locate(&ctx, &name),
        Commands::Steering { kind } => cmd_steering::run(&ctx, kind),
        Commands::Watch => cmd_watch::run(&ctx),
        Commands::Serve { port, bind } => cmd_serve::run(&ctx, port, bind),
    }
}
