//! # mods-export CLI
//!
//! Exports an entity tree from a content-addressed store as one MODS
//! `<modsCollection>` document.
//!
//! ## Usage
//!
//! ```bash
//! mods-export --config ./config/mods-export.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mods-export export <pi>` | Walk the tree under `<pi>` and write the collection file |
//! | `mods-export preview <pi>` | Print the `<mods>` record for a single entity |
//!
//! ## Examples
//!
//! ```bash
//! # Export with the configured defaults
//! mods-export export 01J8ZQ3K --config ./config/mods-export.toml
//!
//! # Shallow export to a custom file, JSON progress on stderr
//! mods-export export 01J8ZQ3K --max-depth 1 --output /tmp/out.xml --progress json
//!
//! # Inspect one record
//! mods-export preview 01J8ZQ3K
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mods_export::config::{self, GraphSource};
use mods_export::export;

/// Export an entity tree as a MODS collection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mods-export.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mods-export",
    about = "Export an entity tree as a MODS bibliographic collection",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mods-export.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the tree rooted at an entity.
    ///
    /// Entities are visited breadth-first, one depth level at a time, in
    /// concurrent batches. Failed entities are listed in the summary and
    /// left out of the file; the command still succeeds.
    Export {
        /// Persistent identifier of the root entity.
        pi: String,

        /// Output file (overrides `export.output`).
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Deepest level to visit; the root is depth 0.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Entities processed concurrently per batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Relationship-graph source: `graphdb`, `embedded`, or `both`.
        #[arg(long)]
        graph_source: Option<GraphSource>,

        /// Leave OCR text and long descriptions out of the records.
        #[arg(long)]
        no_ocr: bool,

        /// Progress output: `off`, `human`, or `json` (stderr).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Print the rendered record for one entity.
    ///
    /// Runs without a config file, against a local store at
    /// `http://localhost:8080`.
    Preview {
        /// Persistent identifier of the entity.
        pi: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preview { pi } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            export::run_preview(&cfg, &pi).await?;
        }
        Commands::Export {
            pi,
            output,
            max_depth,
            batch_size,
            graph_source,
            no_ocr,
            progress,
        } => {
            let mut cfg = config::load_config(&cli.config)?;
            if let Some(output) = output {
                cfg.export.output = output;
            }
            if let Some(max_depth) = max_depth {
                cfg.export.max_depth = max_depth;
            }
            if let Some(batch_size) = batch_size {
                cfg.export.batch_size = batch_size;
            }
            if let Some(graph_source) = graph_source {
                cfg.export.graph_source = graph_source;
            }
            if no_ocr {
                cfg.export.include_ocr = false;
            }
            if progress.is_some() {
                cfg.progress.mode = progress;
            }
            cfg.validate()?;

            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing current batch");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let summary = export::run_export(&cfg, &pi, cancel).await?;
            export::print_summary(&summary);
        }
    }

    Ok(())
}
