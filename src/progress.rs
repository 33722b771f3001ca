//! Export progress reporting.
//!
//! Reports observable progress during `mods-export export` so users see which
//! depth level is running, how many entities are done, and how many are still
//! queued. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for an export job.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportProgressEvent {
    /// A new depth level is starting with this many nodes.
    LevelStarted { depth: usize, nodes: usize },
    /// One batch settled; counts are cumulative for the job.
    BatchSettled {
        depth: usize,
        processed: u64,
        queued: u64,
        errors: u64,
    },
    /// The traversal finished (or was cancelled).
    Finished {
        total: u64,
        success: u64,
        incomplete: u64,
        errors: u64,
        elapsed_ms: u64,
    },
}

/// Reports export progress. Implementations write to stderr (human or JSON).
pub trait ExportProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the traversal coordinator only.
    fn report(&self, event: ExportProgressEvent);
}

/// Human-friendly progress on stderr: "export  depth 2  1,234 done  56 queued  3 errors".
pub struct StderrProgress;

impl ExportProgressReporter for StderrProgress {
    fn report(&self, event: ExportProgressEvent) {
        let line = match &event {
            ExportProgressEvent::LevelStarted { depth, nodes } => {
                format!("export  depth {}  {} nodes\n", depth, format_number(*nodes as u64))
            }
            ExportProgressEvent::BatchSettled {
                depth,
                processed,
                queued,
                errors,
            } => format!(
                "export  depth {}  {} done  {} queued  {} errors\n",
                depth,
                format_number(*processed),
                format_number(*queued),
                format_number(*errors)
            ),
            ExportProgressEvent::Finished {
                total,
                success,
                incomplete,
                errors,
                elapsed_ms,
            } => format!(
                "export  finished  {} visited ({} ok, {} incomplete, {} errors) in {:.1}s\n",
                format_number(*total),
                format_number(*success),
                format_number(*incomplete),
                format_number(*errors),
                *elapsed_ms as f64 / 1000.0
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ExportProgressReporter for JsonProgress {
    fn report(&self, event: ExportProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &ExportProgressEvent) -> serde_json::Value {
    match event {
        ExportProgressEvent::LevelStarted { depth, nodes } => serde_json::json!({
            "event": "progress",
            "phase": "level",
            "depth": depth,
            "nodes": nodes
        }),
        ExportProgressEvent::BatchSettled {
            depth,
            processed,
            queued,
            errors,
        } => serde_json::json!({
            "event": "progress",
            "phase": "batch",
            "depth": depth,
            "processed": processed,
            "queued": queued,
            "errors": errors
        }),
        ExportProgressEvent::Finished {
            total,
            success,
            incomplete,
            errors,
            elapsed_ms,
        } => serde_json::json!({
            "event": "finished",
            "total": total,
            "success": success,
            "incomplete": incomplete,
            "errors": errors,
            "elapsed_ms": elapsed_ms
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ExportProgressReporter for NoProgress {
    fn report(&self, _event: ExportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Resolve a configured mode name; `auto` and `None` use [`default_for_tty`](Self::default_for_tty).
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("off") => ProgressMode::Off,
            Some("human") => ProgressMode::Human,
            Some("json") => ProgressMode::Json,
            _ => ProgressMode::default_for_tty(),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ExportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
