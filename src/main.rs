//! # Record RAG CLI (`rrag`)
//!
//! ```bash
//! rrag --config ./config/rrag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rrag build [logs\|trips]` | Build or restore indexes and write snapshots |
//! | `rrag search "<query>"` | Vector search over network logs + root-cause summary |
//! | `rrag ask "<query>"` | Filter trips from a natural-language question |
//! | `rrag parse "<query>"` | Show the structured filter parsed from a question |
//! | `rrag watch` | Keep indexes in step with their source files |
//! | `rrag evaluate` | Measure precision@k and latency |
//! | `rrag metrics` | Show the last evaluation report |
//! | `rrag serve` | HTTP server with background watchers |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use record_rag::builder::{run_build, BuildTarget};
use record_rag::config::load_config;
use record_rag::core::parser::{parse, Language};
use record_rag::core::search::LogFilter;

/// Record RAG: retrieval-augmented answers over network logs and trip tables.
#[derive(Parser)]
#[command(name = "rrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rrag.toml")]
    config: PathBuf,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or restore from snapshot) the configured indexes.
    Build {
        #[arg(value_enum)]
        target: Option<Target>,
    },

    /// Semantic search over network logs.
    Search {
        query: String,

        /// Number of results (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,

        /// Only this node, e.g. node_1.
        #[arg(long)]
        node: Option<String>,

        #[arg(long)]
        severity: Option<String>,

        /// Only this alarm code.
        #[arg(long)]
        alarm: Option<String>,

        /// Skip the LLM summary.
        #[arg(long)]
        no_summary: bool,
    },

    /// Answer a trip question through the filter parser.
    Ask {
        query: String,

        #[arg(long)]
        no_summary: bool,
    },

    /// Print the structured filter for a question as JSON.
    Parse { query: String },

    /// Watch source files and update indexes until Ctrl-C.
    Watch,

    /// Run the evaluation query set against the log index.
    Evaluate,

    /// Print the last evaluation report.
    Metrics,

    /// Start the HTTP server.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Logs,
    Trips,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = || load_config(&cli.config);

    match cli.command {
        Commands::Build { target } => {
            let target = match target {
                Some(Target::Logs) => BuildTarget::Logs,
                Some(Target::Trips) => BuildTarget::Trips,
                None => BuildTarget::All,
            };
            run_build(&config()?, target).await?;
        }
        Commands::Search {
            query,
            k,
            node,
            severity,
            alarm,
            no_summary,
        } => {
            let filter = LogFilter {
                node_id: node,
                severity,
                alarm_code: alarm,
            };
            record_rag::search::run_search(&config()?, &query, k, filter, !no_summary).await?;
        }
        Commands::Ask { query, no_summary } => {
            record_rag::ask::run_ask(&config()?, &query, !no_summary).await?;
        }
        // Needs no config.
        Commands::Parse { query } => {
            let out = serde_json::json!({
                "language": Language::detect(&query),
                "filter": parse(&query),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Watch => record_rag::watcher::run_watch(&config()?).await?,
        Commands::Evaluate => record_rag::evaluate::run_evaluate(&config()?).await?,
        Commands::Metrics => record_rag::evaluate::run_metrics(&config()?)?,
        Commands::Serve => record_rag::server::run_server(&config()?).await?,
    }

    Ok(())
}
