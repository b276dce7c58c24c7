//! crane-imports - console for crane application import pipelines.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crane_pipelines::CranePipelineAction;
use crane_pipelines::observability::{TracingConfig, TracingConfigBuilder, init_tracing};
use std::path::PathBuf;
use std::time::Duration;

/// Inspect, start and delete crane application imports.
#[derive(Parser)]
#[command(name = "crane-imports")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Namespace to operate in (defaults to the kubeconfig context namespace)
    #[arg(short, long, env = "CRANE_NAMESPACE", global = true)]
    namespace: Option<String>,

    /// Seconds to wait for the watch to reflect a change
    #[arg(long, default_value = "60", global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List imports in the namespace
    List,

    /// Show the run history of an import
    History {
        /// Import name
        group: String,
    },

    /// Run the stage pipeline of an import
    Stage {
        /// Import name
        group: String,

        /// Return as soon as the API server accepts the start
        #[arg(long)]
        no_wait: bool,
    },

    /// Run the cutover pipeline of an import
    Cutover {
        /// Import name
        group: String,

        /// Return as soon as the API server accepts the start
        #[arg(long)]
        no_wait: bool,
    },

    /// Delete an import and everything it owns
    Delete {
        /// Import name
        group: String,
    },

    /// Delete one PipelineRun
    DeleteRun {
        /// PipelineRun name
        run: String,
    },

    /// Create a new import from pipeline and run documents
    Import {
        /// Import name
        #[arg(long)]
        name: String,

        /// Cutover Pipeline YAML
        #[arg(long)]
        cutover_pipeline: PathBuf,

        /// Cutover PipelineRun YAML
        #[arg(long)]
        cutover_run: PathBuf,

        /// Stage Pipeline YAML (imports that copy persistent volume claims)
        #[arg(long, requires = "stage_run")]
        stage_pipeline: Option<PathBuf>,

        /// Stage PipelineRun YAML
        #[arg(long, requires = "stage_pipeline")]
        stage_run: Option<PathBuf>,

        /// Secret to put under the import's ownership (repeatable)
        #[arg(long = "secret")]
        secrets: Vec<String>,
    },

    /// Print a summary of every import whenever it changes
    Watch,

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<crane_pipelines::observability::TracingGuard> {
    let from_env = TracingConfig::from_env();

    // An explicit filter in the environment wins over -v.
    let filter = if std::env::var_os("CRANE_LOG_LEVEL").is_some()
        || std::env::var_os("RUST_LOG").is_some()
    {
        from_env.log_filter().to_string()
    } else {
        TracingConfig::verbosity_filter(verbosity).to_string()
    };

    let config = TracingConfigBuilder::from_config(&from_env)
        .log_filter(filter)
        .build();

    init_tracing(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose)?;

    if let Commands::Version = cli.command {
        return commands::version::run();
    }

    let ctx = commands::Context::connect(cli.namespace, Duration::from_secs(cli.timeout)).await?;

    match cli.command {
        Commands::List => commands::list::run(&ctx).await,
        Commands::History { group } => commands::history::run(&ctx, &group).await,
        Commands::Stage { group, no_wait } => {
            commands::start::run(&ctx, &group, CranePipelineAction::Stage, !no_wait).await
        }
        Commands::Cutover { group, no_wait } => {
            commands::start::run(&ctx, &group, CranePipelineAction::Cutover, !no_wait).await
        }
        Commands::Delete { group } => commands::delete::group(&ctx, &group).await,
        Commands::DeleteRun { run } => commands::delete::run(&ctx, &run).await,
        Commands::Import {
            name,
            cutover_pipeline,
            cutover_run,
            stage_pipeline,
            stage_run,
            secrets,
        } => {
            let files = commands::import::ImportFiles {
                cutover_pipeline,
                cutover_run,
                stage_pipeline,
                stage_run,
            };
            commands::import::run(&ctx, &name, &files, &secrets).await
        }
        Commands::Watch => commands::watch::run(&ctx).await,
        Commands::Version => commands::version::run(),
    }
}
