//! Breadth-first traversal with level barriers and bounded batch concurrency.
//!
//! # Algorithm
//!
//! The coordinator (the task running [`Exporter::run`]) owns the FIFO queue
//! and the visited set; worker tasks only see an identifier and hand back a
//! [`ProcessedEntity`].
//!
//! ```text
//! queue: [A(0)]
//! loop:
//!   level  = every queued node at the front's depth
//!   for chunk in level.chunks(batch_size):
//!       spawn one task per node          ← at most batch_size in flight
//!       write each fragment as its task completes
//!       fold outcomes in queue order:
//!           error            → children unknown, not enqueued
//!           depth < max_depth → enqueue unseen children at depth + 1
//! ```
//!
//! Depth `d + 1` never starts before every node at depth `d` has settled.
//! Within a chunk, records are written in completion order, which varies from
//! run to run. A shared child is enqueued once, under whichever parent comes
//! first in queue order.
//!
//! Only a sink failure ends the job early with an error. Cancellation is
//! checked between chunks and ends the job with a summary marked `cancelled`.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

use crate::error::ExportError;
use crate::models::{ExportOutcome, OutcomeStatus, TraversalNode};
use crate::process::{EntityProcessor, ProcessedEntity};
use crate::progress::{ExportProgressEvent, ExportProgressReporter, NoProgress};
use crate::summary::{ExportSummary, SummaryBuilder};
use crate::writer::{record_id_for, CollectionWriter, Sink};

#[derive(Debug, Clone, Copy)]
pub struct TraversalOptions {
    pub max_depth: usize,
    pub batch_size: usize,
}

impl TraversalOptions {
    pub fn from_config(config: &crate::config::ExportConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            batch_size: config.batch_size,
        }
    }
}

pub struct Exporter {
    processor: Arc<EntityProcessor>,
    options: TraversalOptions,
    reporter: Box<dyn ExportProgressReporter>,
    cancel: Arc<AtomicBool>,
}

impl Exporter {
    pub fn new(processor: EntityProcessor, options: TraversalOptions) -> Self {
        Self {
            processor: Arc::new(processor),
            options: TraversalOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            reporter: Box::new(NoProgress),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ExportProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop scheduling new chunks once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Export the tree under `root_pi` into `writer`, opening and closing it.
    pub async fn run<S: Sink>(
        &self,
        root_pi: &str,
        writer: &mut CollectionWriter<S>,
    ) -> Result<ExportSummary, ExportError> {
        let mut summary = SummaryBuilder::new(root_pi);
        tracing::info!(
            root = root_pi,
            max_depth = self.options.max_depth,
            batch_size = self.options.batch_size,
            "starting export"
        );

        if let Err(e) = writer.open().await {
            tracing::error!(error = %e, "could not open output");
            if let Err(close_err) = writer.close().await {
                tracing::warn!(error = %close_err, "closing output after failed open");
            }
            return Err(e.into());
        }

        let cancelled = match self.walk(root_pi, writer, &mut summary).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                tracing::error!(error = %e, "export aborted");
                if let Err(close_err) = writer.close().await {
                    tracing::warn!(error = %close_err, "closing output after failure");
                }
                return Err(e);
            }
        };

        writer.close().await?;

        let summary = summary.finish(
            writer.records_written(),
            writer.bytes_written(),
            writer.location(),
            cancelled,
        );
        self.reporter.report(ExportProgressEvent::Finished {
            total: summary.total,
            success: summary.success,
            incomplete: summary.incomplete,
            errors: summary.errors,
            elapsed_ms: summary.elapsed_ms,
        });
        tracing::info!(
            job = %summary.job_id,
            total = summary.total,
            success = summary.success,
            incomplete = summary.incomplete,
            errors = summary.errors,
            cancelled,
            "export finished"
        );
        Ok(summary)
    }

    /// Returns `true` when the walk stopped because of cancellation.
    async fn walk<S: Sink>(
        &self,
        root_pi: &str,
        writer: &mut CollectionWriter<S>,
        summary: &mut SummaryBuilder,
    ) -> Result<bool, ExportError> {
        let mut queue = VecDeque::from([TraversalNode::root(root_pi)]);
        let mut visited = HashSet::from([root_pi.to_string()]);

        while let Some(depth) = queue.front().map(|n| n.depth) {
            let mut level = Vec::new();
            while queue.front().is_some_and(|n| n.depth == depth) {
                if let Some(node) = queue.pop_front() {
                    level.push(node);
                }
            }
            tracing::debug!(depth, nodes = level.len(), "starting level");
            self.reporter.report(ExportProgressEvent::LevelStarted {
                depth,
                nodes: level.len(),
            });

            for chunk in level.chunks(self.options.batch_size) {
                if self.cancel.load(Ordering::SeqCst) {
                    tracing::warn!(depth, "export cancelled");
                    return Ok(true);
                }

                let outcomes = self.run_chunk(chunk, writer).await?;

                for (node, outcome) in chunk.iter().zip(outcomes) {
                    summary.record(&outcome, node.depth);
                    if outcome.status == OutcomeStatus::Error || node.depth >= self.options.max_depth {
                        continue;
                    }
                    for child in &outcome.children {
                        let child = child.trim();
                        if !child.is_empty() && visited.insert(child.to_string()) {
                            queue.push_back(node.child(child));
                        }
                    }
                }

                summary.sample_memory();
                self.reporter.report(ExportProgressEvent::BatchSettled {
                    depth,
                    processed: summary.total(),
                    queued: queue.len() as u64,
                    errors: summary.errors(),
                });
            }
        }
        Ok(false)
    }

    /// Process one chunk concurrently, writing fragments as tasks finish.
    ///
    /// Outcomes are returned in chunk order.
    async fn run_chunk<S: Sink>(
        &self,
        chunk: &[TraversalNode],
        writer: &mut CollectionWriter<S>,
    ) -> Result<Vec<ExportOutcome>, ExportError> {
        let mut aborts: Vec<AbortHandle> = Vec::with_capacity(chunk.len());
        let mut pending = FuturesUnordered::new();
        for (index, node) in chunk.iter().enumerate() {
            let processor = Arc::clone(&self.processor);
            let pi = node.pi.clone();
            let handle = tokio::spawn(async move { processor.process(&pi).await });
            aborts.push(handle.abort_handle());
            pending.push(async move { (index, handle.await) });
        }

        let mut outcomes: Vec<Option<ExportOutcome>> = vec![None; chunk.len()];
        while let Some((index, joined)) = pending.next().await {
            let node = &chunk[index];
            let processed = joined.unwrap_or_else(|e| {
                tracing::warn!(pi = %node.pi, error = %e, "entity task failed");
                ProcessedEntity {
                    outcome: ExportOutcome::error(&node.pi, format!("task failed: {}", e)),
                    fragment: None,
                }
            });

            if let Some(fragment) = &processed.fragment {
                if let Err(e) = writer.write(&record_id_for(&node.pi), fragment, node).await {
                    for abort in &aborts {
                        abort.abort();
                    }
                    return Err(e.into());
                }
            }
            outcomes[index] = Some(processed.outcome);
        }

        Ok(outcomes
            .into_iter()
            .zip(chunk)
            .map(|(outcome, node)| {
                outcome.unwrap_or_else(|| ExportOutcome::error(&node.pi, "task did not settle"))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::SinkError;
    use crate::store::MemoryStore;
    use crate::writer::IoSink;
    use async_trait::async_trait;
    use std::time::Duration;

    fn meta(title: &str) -> String {
        format!(r#"{{"title":"{}","type":"Text"}}"#, title)
    }

    fn exporter(store: Arc<MemoryStore>, max_depth: usize, batch_size: usize) -> Exporter {
        let processor = EntityProcessor::new(store, &Config::minimal()).unwrap();
        Exporter::new(
            processor,
            TraversalOptions {
                max_depth,
                batch_size,
            },
        )
    }

    async fn export(exporter: &Exporter, root: &str) -> (ExportSummary, String) {
        let mut writer = CollectionWriter::new(IoSink::new(Vec::<u8>::new(), "memory"));
        let summary = exporter.run(root, &mut writer).await.unwrap();
        let out = String::from_utf8(writer.into_sink().into_inner()).unwrap();
        (summary, out)
    }

    /// R ─┬─ C1 ─┬─ G1
    ///    │      └─ G2
    ///    └─ C2 ─── G3
    fn three_level_tree() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.add_entity("R", None, &["C1", "C2"], Some(meta("Root").as_str()), &[]);
        store.add_entity("C1", Some("R"), &["G1", "G2"], Some(meta("Child 1").as_str()), &[]);
        store.add_entity("C2", Some("R"), &["G3"], Some(meta("Child 2").as_str()), &[]);
        store.add_entity("G1", Some("C1"), &[], Some(meta("Grand 1").as_str()), &[]);
        store.add_entity("G2", Some("C1"), &["GG"], Some(meta("Grand 2").as_str()), &[]);
        store.add_entity("G3", Some("C2"), &[], Some(meta("Grand 3").as_str()), &[]);
        store.add_entity("GG", Some("G2"), &[], Some(meta("Great").as_str()), &[]);
        Arc::new(store)
    }

    fn depth_of(out: &str, pi: &str) -> Option<usize> {
        let marker = format!("ID=\"{}\"", record_id_for(pi));
        let record = &out[out.find(&marker)?..];
        let depth_at = record.find("Depth: ")? + "Depth: ".len();
        record[depth_at..]
            .split(|c: char| !c.is_ascii_digit())
            .next()?
            .parse()
            .ok()
    }

    #[tokio::test]
    async fn failing_grandchild_is_excluded_with_its_subtree() {
        let store = three_level_tree();
        store.fail("G2");
        let (summary, out) = export(&exporter(store.clone(), 5, 2), "R").await;

        assert_eq!(summary.total, 6);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.success, 5);
        assert!(summary.is_consistent());
        assert_eq!(summary.error_details[0].pi, "G2");
        assert_eq!(summary.records_written, 5);
        assert_eq!(out.matches("<mods ").count(), 5);
        assert!(!out.contains(&record_id_for("G2")));
        assert_eq!(store.fetch_count("GG"), 0);
    }

    #[tokio::test]
    async fn single_entity_without_metadata_is_incomplete() {
        let store = MemoryStore::new();
        store.add_entity("01LONE", None, &[], None, &[]);
        let (summary, out) = export(&exporter(Arc::new(store), 5, 10), "01LONE").await;

        assert_eq!((summary.total, summary.incomplete, summary.errors), (1, 1, 0));
        assert_eq!(out.matches("<mods ").count(), 1);
        assert!(out.contains("<title>Incomplete record: 01LONE</title>"));
        assert!(out.contains("This record is incomplete"));
    }

    #[tokio::test]
    async fn incomplete_records_still_yield_children() {
        let store = MemoryStore::new();
        store.add_entity("R", None, &["C"], None, &[]);
        store.add_entity("C", Some("R"), &[], Some(meta("Child").as_str()), &[]);
        let (summary, _) = export(&exporter(Arc::new(store), 5, 10), "R").await;
        assert_eq!((summary.total, summary.success, summary.incomplete), (2, 1, 1));
    }

    #[tokio::test]
    async fn shared_child_is_visited_once() {
        let store = MemoryStore::new();
        store.add_entity("R", None, &["A", "B"], Some(meta("Root").as_str()), &[]);
        store.add_entity("A", Some("R"), &["S"], Some(meta("A").as_str()), &[]);
        store.add_entity("B", Some("R"), &["S", "R"], Some(meta("B").as_str()), &[]);
        store.add_entity("S", Some("A"), &[], Some(meta("Shared").as_str()), &[]);
        let store = Arc::new(store);

        let (summary, out) = export(&exporter(store.clone(), 5, 1), "R").await;
        assert_eq!(summary.total, 4);
        assert_eq!(store.fetch_count("S"), 1);
        assert_eq!(store.fetch_count("R"), 1);
        assert_eq!(out.matches(&format!("ID=\"{}\"", record_id_for("S"))).count(), 1);
        // First discovered under A, which precedes B in the queue.
        assert!(out.contains("Path: R &gt; A &gt; S"));
    }

    #[tokio::test]
    async fn max_depth_bounds_traversal() {
        let store = three_level_tree();
        let (summary, _) = export(&exporter(store.clone(), 1, 10), "R").await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.max_depth_reached, 1);
        assert_eq!(store.fetch_count("G1"), 0);

        let (summary, _) = export(&exporter(three_level_tree(), 0, 10), "R").await;
        assert_eq!(summary.total, 1);
    }

    #[tokio::test]
    async fn in_flight_work_never_exceeds_batch_size() {
        let store = MemoryStore::new();
        let children: Vec<String> = (0..9).map(|i| format!("K{}", i)).collect();
        let refs: Vec<&str> = children.iter().map(String::as_str).collect();
        store.add_entity("R", None, &refs, Some(meta("Root").as_str()), &[]);
        for c in &children {
            store.add_entity(c, Some("R"), &[], Some(meta(c).as_str()), &[]);
            store.set_latency(c, Duration::from_millis(20));
        }
        let store = Arc::new(store);

        let (summary, _) = export(&exporter(store.clone(), 5, 3), "R").await;
        assert_eq!(summary.total, 10);
        assert!(store.max_in_flight() <= 3, "saw {}", store.max_in_flight());
        assert!(store.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn levels_are_written_in_depth_order() {
        let store = three_level_tree();
        // Slow child: its level must still finish before grandchildren start.
        store.set_latency("C2", Duration::from_millis(30));
        let (_, out) = export(&exporter(store, 5, 10), "R").await;

        let pos = |pi: &str| out.find(&format!("ID=\"{}\"", record_id_for(pi))).unwrap();
        assert!(pos("R") < pos("C1") && pos("R") < pos("C2"));
        for g in ["G1", "G2", "G3"] {
            assert!(pos("C2") < pos(g));
            assert!(pos("C1") < pos(g));
        }
        assert!(pos("G2") < pos("GG"));
    }

    #[tokio::test]
    async fn hierarchy_depth_is_parent_plus_one() {
        let (summary, out) = export(&exporter(three_level_tree(), 5, 2), "R").await;
        assert_eq!(summary.total, 7);
        assert_eq!(depth_of(&out, "R"), Some(0));
        for (child, parent) in [("C1", "R"), ("C2", "R"), ("G1", "C1"), ("G3", "C2"), ("GG", "G2")] {
            assert_eq!(depth_of(&out, child), depth_of(&out, parent).map(|d| d + 1));
        }
    }

    #[tokio::test]
    async fn root_failure_is_reported_not_raised() {
        let store = three_level_tree();
        store.fail("R");
        let (summary, out) = export(&exporter(store, 5, 2), "R").await;
        assert_eq!((summary.total, summary.errors, summary.records_written), (1, 1, 0));
        assert!(out.ends_with("</modsCollection>\n"));
    }

    struct BrokenSink {
        writes_left: usize,
    }

    #[async_trait]
    impl Sink for BrokenSink {
        async fn write(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
            if self.writes_left == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.writes_left -= 1;
            Ok(())
        }
        async fn close(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn location(&self) -> String {
            "broken".to_string()
        }
    }

    #[tokio::test]
    async fn sink_failure_aborts_the_job() {
        let exporter = exporter(three_level_tree(), 5, 2);

        // Header and root record succeed, the first child fails.
        let mut writer = CollectionWriter::new(BrokenSink { writes_left: 2 });
        let err = exporter.run("R", &mut writer).await.unwrap_err();
        assert!(matches!(err, ExportError::Sink(SinkError::Write(_))));

        let mut writer = CollectionWriter::new(BrokenSink { writes_left: 0 });
        assert!(exporter.run("R", &mut writer).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_between_chunks() {
        let flag = Arc::new(AtomicBool::new(true));
        let exporter = exporter(three_level_tree(), 5, 2).with_cancel_flag(flag);
        let (summary, out) = export(&exporter, "R").await;
        assert!(summary.cancelled);
        assert_eq!(summary.total, 0);
        assert!(out.ends_with("</modsCollection>\n"));
    }
}
