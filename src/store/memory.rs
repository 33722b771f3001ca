//! In-memory [`ObjectStore`] for tests and offline runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Entities can be made to fail
//! or to respond slowly, and the store records how many manifest fetches it
//! served and the highest number that were in flight at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::ObjectStore;
use crate::error::RetrievalError;
use crate::models::{EntityManifest, METADATA_COMPONENT};
use crate::source::RelationshipGraph;

pub struct MemoryStore {
    manifests: RwLock<HashMap<String, EntityManifest>>,
    components: RwLock<HashMap<String, Vec<u8>>>,
    graphs: RwLock<HashMap<String, RelationshipGraph>>,
    failing: RwLock<HashSet<String>>,
    latency: RwLock<HashMap<String, Duration>>,
    fetches: RwLock<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            manifests: RwLock::new(HashMap::new()),
            components: RwLock::new(HashMap::new()),
            graphs: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            latency: RwLock::new(HashMap::new()),
            fetches: RwLock::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn insert_manifest(&self, manifest: EntityManifest) {
        if let Ok(mut m) = self.manifests.write() {
            m.insert(manifest.pi.clone(), manifest);
        }
    }

    pub fn insert_component(&self, cid: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut c) = self.components.write() {
            c.insert(cid.to_string(), bytes.into());
        }
    }

    pub fn insert_graph(&self, pi: &str, graph: RelationshipGraph) {
        if let Ok(mut g) = self.graphs.write() {
            g.insert(pi.to_string(), graph);
        }
    }

    /// Add an entity with synthetic fingerprints.
    ///
    /// `metadata` becomes the `metadata.json` component when given;
    /// `extra` adds further named components as `(name, content)`.
    pub fn add_entity(
        &self,
        pi: &str,
        parent: Option<&str>,
        children: &[&str],
        metadata: Option<&str>,
        extra: &[(&str, &str)],
    ) {
        let mut components = BTreeMap::new();
        if let Some(meta) = metadata {
            let cid = format!("cid-{}-metadata", pi);
            self.insert_component(&cid, meta);
            components.insert(METADATA_COMPONENT.to_string(), cid);
        }
        for (name, content) in extra {
            let cid = format!("cid-{}-{}", pi, name);
            self.insert_component(&cid, *content);
            components.insert(name.to_string(), cid);
        }
        self.insert_manifest(EntityManifest {
            pi: pi.to_string(),
            ver: 1,
            manifest_cid: format!("cid-{}-manifest", pi),
            ts: "2025-01-01T00:00:00Z".to_string(),
            components,
            parent_pi: parent.map(str::to_string),
            children_pi: if children.is_empty() {
                None
            } else {
                Some(children.iter().map(|c| c.to_string()).collect())
            },
        });
    }

    /// Make every manifest fetch for `pi` fail with a server error.
    pub fn fail(&self, pi: &str) {
        if let Ok(mut f) = self.failing.write() {
            f.insert(pi.to_string());
        }
    }

    /// Delay every manifest fetch for `pi`.
    pub fn set_latency(&self, pi: &str, delay: Duration) {
        if let Ok(mut l) = self.latency.write() {
            l.insert(pi.to_string(), delay);
        }
    }

    /// Number of manifest fetches served for `pi`.
    pub fn fetch_count(&self, pi: &str) -> usize {
        self.fetches
            .read()
            .map(|f| f.get(pi).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Highest number of manifest fetches observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when a fetch finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch_manifest(&self, pi: &str) -> Result<EntityManifest, RetrievalError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Ok(mut f) = self.fetches.write() {
            *f.entry(pi.to_string()).or_insert(0) += 1;
        }

        let delay = self.latency.read().ok().and_then(|l| l.get(pi).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let failing = self.failing.read().map(|f| f.contains(pi)).unwrap_or(false);
        if failing {
            return Err(RetrievalError::Status {
                what: format!("manifest for {}", pi),
                status: 500,
                body: "injected failure".to_string(),
            });
        }

        self.manifests
            .read()
            .ok()
            .and_then(|m| m.get(pi).cloned())
            .ok_or_else(|| RetrievalError::NotFound {
                what: format!("manifest for {}", pi),
            })
    }

    async fn fetch_component(&self, cid: &str) -> Result<Vec<u8>, RetrievalError> {
        self.components
            .read()
            .ok()
            .and_then(|c| c.get(cid).cloned())
            .ok_or_else(|| RetrievalError::NotFound {
                what: format!("component {}", cid),
            })
    }

    async fn fetch_entity_graph(
        &self,
        pi: &str,
    ) -> Result<Option<RelationshipGraph>, RetrievalError> {
        Ok(self.graphs.read().ok().and_then(|g| g.get(pi).cloned()))
    }
}
