//! `export` and `preview` command orchestration.
//!
//! Wires configuration into the store, processor, writer, progress reporter,
//! and notifier, runs one job, and prints its summary on stdout.

use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::Config;
use crate::notify::{notifier_from_config, notify_quietly, JobReport};
use crate::process::EntityProcessor;
use crate::progress::ProgressMode;
use crate::store::{HttpStore, ObjectStore};
use crate::summary::ExportSummary;
use crate::text::format_bytes;
use crate::traverse::{Exporter, TraversalOptions};
use crate::writer::{file_sink, CollectionWriter};

fn http_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let store = HttpStore::new(&config.store).context("Failed to build HTTP client")?;
    Ok(Arc::new(store))
}

/// Export the tree rooted at `pi` to `config.export.output`.
///
/// Node-level failures are reported in the returned summary; only setup and
/// sink failures are returned as errors.
pub async fn run_export(config: &Config, pi: &str, cancel: Arc<AtomicBool>) -> Result<ExportSummary> {
    let store = http_store(config)?;
    run_export_with_store(config, store, pi, cancel).await
}

pub async fn run_export_with_store(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    pi: &str,
    cancel: Arc<AtomicBool>,
) -> Result<ExportSummary> {
    let notifier = notifier_from_config(&config.notify);
    match export_to_file(config, store, pi, cancel).await {
        Ok(summary) => {
            notify_quietly(notifier.as_ref(), &JobReport::Completed(&summary)).await;
            Ok(summary)
        }
        Err(e) => {
            let report = JobReport::Failed {
                root_pi: pi,
                error: format!("{:#}", e),
            };
            notify_quietly(notifier.as_ref(), &report).await;
            Err(e)
        }
    }
}

async fn export_to_file(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    pi: &str,
    cancel: Arc<AtomicBool>,
) -> Result<ExportSummary> {
    let processor = EntityProcessor::new(store, config)?;
    let progress = ProgressMode::from_name(config.progress.mode.as_deref());
    let exporter = Exporter::new(processor, TraversalOptions::from_config(&config.export))
        .with_reporter(progress.reporter())
        .with_cancel_flag(cancel);

    let sink = file_sink(&config.export.output).await?;
    let mut writer = CollectionWriter::new(sink);
    let summary = exporter.run(pi, &mut writer).await?;
    Ok(summary)
}

/// Print the summary in the same `key: value` layout as other commands.
pub fn print_summary(summary: &ExportSummary) {
    println!("export {}", summary.root_pi);
    println!("  job: {}", summary.job_id);
    println!("  visited: {}", summary.total);
    println!("  success: {}", summary.success);
    println!("  incomplete: {}", summary.incomplete);
    println!("  errors: {}", summary.errors);
    for issue in &summary.error_details {
        println!("    error {} (depth {}): {}", issue.pi, issue.depth, issue.reason);
    }
    for issue in &summary.incomplete_details {
        println!("    incomplete {} (depth {}): {}", issue.pi, issue.depth, issue.reason);
    }
    println!("  records written: {}", summary.records_written);
    println!("  bytes written: {}", format_bytes(summary.bytes_written));
    if let Some(peak) = summary.peak_memory_bytes {
        println!("  peak memory: {}", format_bytes(peak));
    }
    println!("  elapsed: {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!("  output: {}", summary.output);
    if summary.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}

/// Fetch one entity and print its rendered `<mods>` fragment.
pub async fn run_preview(config: &Config, pi: &str) -> Result<()> {
    let processor = EntityProcessor::new(http_store(config)?, config)?;
    let xml = processor
        .preview(pi)
        .await
        .with_context(|| format!("Failed to preview {}", pi))?;
    println!("{}", xml);
    Ok(())
}
