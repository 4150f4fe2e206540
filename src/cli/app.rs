//! Main CLI application structure

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{propagate, query};
use crate::domain::GraphStore;
use crate::engine::Engine;
use crate::storage::{Config, SnapshotStore};

#[derive(Parser)]
#[command(name = "procflow")]
#[command(author, version, about = "Status propagation over process dependency graphs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the configured format, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to procflow.toml beside the graph)
    #[arg(long, global = true, env = "PROCFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a graph, re-derive cascades and report cycles
    Check {
        /// Graph snapshot (JSON)
        graph: PathBuf,
    },

    /// Change a node's status and show what propagated
    Status {
        /// Graph snapshot (JSON)
        graph: PathBuf,

        /// Node ID
        node: String,

        /// New status (pending, active, completed, blocked, archived)
        status: String,

        /// Save the resulting graph back to the snapshot
        #[arg(long)]
        write: bool,
    },

    /// Structural report: metrics, critical path, bottlenecks
    Report {
        /// Graph snapshot (JSON)
        graph: PathBuf,
    },

    /// Show nodes whose dependencies are all fulfilled
    Ready {
        /// Graph snapshot (JSON)
        graph: PathBuf,
    },
}

impl Commands {
    fn graph_path(&self) -> &Path {
        match self {
            Commands::Check { graph }
            | Commands::Status { graph, .. }
            | Commands::Report { graph }
            | Commands::Ready { graph } => graph,
        }
    }
}

/// A loaded snapshot and the engine built over it
pub(crate) struct Session {
    pub store: SnapshotStore,
    pub engine: Engine,
}

impl Session {
    fn open(graph_path: &Path, config: &Config, output: &Output) -> Result<Self> {
        let store = SnapshotStore::new(graph_path);
        let graph = store.load()?;
        output.verbose_ctx(
            "load",
            &format!(
                "Loaded {} with {} nodes, {} edges",
                graph_path.display(),
                graph.node_count(),
                graph.edge_count()
            ),
        );

        let engine = Engine::with_config(graph, config.engine().clone());
        Ok(Self { store, engine })
    }
}

/// Installs the tracing subscriber.
///
/// `PROCFLOW_LOG` holds an `EnvFilter` directive; `PROCFLOW_LOG_FORMAT=json`
/// switches to JSON lines. Logs go to stderr so stdout stays parseable.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PROCFLOW_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "procflow=debug,info"
        } else {
            "procflow=info,warn"
        })
    });

    let format = env::var("PROCFLOW_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed when embedded; keep it
    let _ = match format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let graph_path = cli.command.graph_path().to_path_buf();
    let config = Config::load(cli.config.as_deref(), &graph_path)?;
    let output = Output::new(cli.format.unwrap_or(config.default_format()), cli.verbose);

    match &config.source {
        Some(path) => output.verbose_ctx("config", &format!("Using {}", path.display())),
        None => output.verbose_ctx("config", "Using default configuration"),
    }

    let session = Session::open(&graph_path, &config, &output)?;

    match cli.command {
        Commands::Check { .. } => propagate::check(session, &output)?,
        Commands::Status {
            node,
            status,
            write,
            ..
        } => propagate::status(session, &output, &node, &status, write)?,
        Commands::Report { .. } => query::report(session, &output)?,
        Commands::Ready { .. } => query::ready(session, &output)?,
    }

    Ok(())
}
