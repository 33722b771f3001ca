//! Result aggregation for one export job.
//!
//! The coordinator folds every [`ExportOutcome`] into a [`SummaryBuilder`]
//! after its batch settles; [`SummaryBuilder::finish`] produces the
//! serialisable [`ExportSummary`] printed by the CLI and sent to the notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use uuid::Uuid;

use crate::models::{ExportOutcome, OutcomeStatus};

/// Why one entity was not exported cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityIssue {
    pub pi: String,
    pub depth: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportSummary {
    pub job_id: String,
    pub root_pi: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total: u64,
    pub success: u64,
    pub incomplete: u64,
    pub errors: u64,
    pub error_details: Vec<EntityIssue>,
    pub incomplete_details: Vec<EntityIssue>,
    pub records_written: u64,
    pub bytes_written: u64,
    /// Highest resident set size sampled during the job, in bytes.
    pub peak_memory_bytes: Option<u64>,
    pub max_depth_reached: usize,
    pub output: String,
    pub cancelled: bool,
}

impl ExportSummary {
    /// Every visited entity is classified exactly once.
    pub fn is_consistent(&self) -> bool {
        self.success + self.incomplete + self.errors == self.total
    }

    /// Fold another job's summary into this one (e.g. several roots into one report).
    pub fn merge(&mut self, other: &ExportSummary) {
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
        self.elapsed_ms += other.elapsed_ms;
        self.total += other.total;
        self.success += other.success;
        self.incomplete += other.incomplete;
        self.errors += other.errors;
        self.error_details.extend(other.error_details.iter().cloned());
        self.incomplete_details
            .extend(other.incomplete_details.iter().cloned());
        self.records_written += other.records_written;
        self.bytes_written += other.bytes_written;
        self.peak_memory_bytes = match (self.peak_memory_bytes, other.peak_memory_bytes) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.max_depth_reached = self.max_depth_reached.max(other.max_depth_reached);
        self.cancelled |= other.cancelled;
    }
}

/// Samples this process's resident memory.
pub struct MemorySampler {
    system: System,
    pid: Option<Pid>,
    peak: Option<u64>,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            peak: None,
        }
    }

    /// Take a sample and return the peak so far.
    pub fn sample(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        if let Some(mem) = self.system.process(pid).map(|p| p.memory()) {
            self.peak = Some(self.peak.map_or(mem, |p| p.max(mem)));
        }
        self.peak
    }

    pub fn peak(&self) -> Option<u64> {
        self.peak
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SummaryBuilder {
    job_id: String,
    root_pi: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    total: u64,
    success: u64,
    incomplete: u64,
    errors: u64,
    error_details: Vec<EntityIssue>,
    incomplete_details: Vec<EntityIssue>,
    max_depth_reached: usize,
    memory: MemorySampler,
}

impl SummaryBuilder {
    pub fn new(root_pi: &str) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            root_pi: root_pi.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
            total: 0,
            success: 0,
            incomplete: 0,
            errors: 0,
            error_details: Vec::new(),
            incomplete_details: Vec::new(),
            max_depth_reached: 0,
            memory: MemorySampler::new(),
        }
    }

    pub fn record(&mut self, outcome: &ExportOutcome, depth: usize) {
        self.total += 1;
        self.max_depth_reached = self.max_depth_reached.max(depth);
        let issue = || EntityIssue {
            pi: outcome.pi.clone(),
            depth,
            reason: outcome.reason.clone().unwrap_or_default(),
        };
        match outcome.status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::Incomplete => {
                self.incomplete += 1;
                self.incomplete_details.push(issue());
            }
            OutcomeStatus::Error => {
                self.errors += 1;
                self.error_details.push(issue());
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn sample_memory(&mut self) {
        self.memory.sample();
    }

    pub fn finish(
        mut self,
        records_written: u64,
        bytes_written: u64,
        output: String,
        cancelled: bool,
    ) -> ExportSummary {
        self.memory.sample();
        ExportSummary {
            job_id: self.job_id,
            root_pi: self.root_pi,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
            total: self.total,
            success: self.success,
            incomplete: self.incomplete,
            errors: self.errors,
            error_details: self.error_details,
            incomplete_details: self.incomplete_details,
            records_written,
            bytes_written,
            peak_memory_bytes: self.memory.peak(),
            max_depth_reached: self.max_depth_reached,
            output,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_of(outcomes: &[ExportOutcome]) -> ExportSummary {
        let mut b = SummaryBuilder::new("ROOT");
        for (i, o) in outcomes.iter().enumerate() {
            b.record(o, i);
        }
        b.finish(0, 0, "memory".to_string(), false)
    }

    #[test]
    fn counts_by_status() {
        let s = summary_of(&[
            ExportOutcome::success("A", vec![]),
            ExportOutcome::incomplete("B", vec![], "no metadata"),
            ExportOutcome::error("C", "HTTP 500"),
        ]);
        assert_eq!((s.total, s.success, s.incomplete, s.errors), (3, 1, 1, 1));
        assert!(s.is_consistent());
        assert_eq!(s.error_details[0].pi, "C");
        assert_eq!(s.error_details[0].depth, 2);
        assert_eq!(s.incomplete_details[0].reason, "no metadata");
        assert_eq!(s.max_depth_reached, 2);
    }

    #[test]
    fn merge_keeps_consistency() {
        let mut a = summary_of(&[ExportOutcome::success("A", vec![])]);
        let b = summary_of(&[
            ExportOutcome::error("X", "boom"),
            ExportOutcome::success("Y", vec![]),
        ]);
        a.merge(&b);
        assert_eq!(a.total, 3);
        assert_eq!(a.errors, 1);
        assert!(a.is_consistent());
        assert_eq!(a.error_details.len(), 1);
    }

    #[test]
    fn summary_serializes() {
        let s = summary_of(&[ExportOutcome::success("A", vec![])]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["root_pi"], "ROOT");
    }
}
