//! Upstream content-addressed store.
//!
//! The [`ObjectStore`] trait is the only way the exporter reads entity data,
//! so the traversal can run against the HTTP store in production and the
//! in-memory store in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`fetch_manifest`](ObjectStore::fetch_manifest) | Latest manifest for an entity |
//! | [`fetch_component`](ObjectStore::fetch_component) | Raw bytes for a content fingerprint |
//! | [`fetch_entity_graph`](ObjectStore::fetch_entity_graph) | Graph-database view of an entity, if any |

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::models::EntityManifest;
use crate::source::RelationshipGraph;

pub use http::HttpStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the manifest for `pi`. A missing entity is [`RetrievalError::NotFound`].
    async fn fetch_manifest(&self, pi: &str) -> Result<EntityManifest, RetrievalError>;

    /// Fetch the bytes addressed by `cid`.
    async fn fetch_component(&self, cid: &str) -> Result<Vec<u8>, RetrievalError>;

    /// Fetch the entity's graph from a graph database.
    ///
    /// Stores without a graph database return `Ok(None)`.
    async fn fetch_entity_graph(
        &self,
        _pi: &str,
    ) -> Result<Option<RelationshipGraph>, RetrievalError> {
        Ok(None)
    }

    /// Fetch a component and decode it as UTF-8 text (lossy).
    async fn fetch_text(&self, cid: &str) -> Result<String, RetrievalError> {
        let bytes = self.fetch_component(cid).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
