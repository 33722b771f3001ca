//! Per-entity export pipeline.
//!
//! One call to [`EntityProcessor::process`] runs inside one worker task and
//! turns an entity identifier into an [`ExportOutcome`] plus, unless the
//! entity failed, a rendered `<mods>` fragment:
//!
//! ```text
//! manifest ─▶ metadata.json ─▶ crosswalk ─▶ annotate ─▶ link ─▶ render
//!               │ absent                       ▲          ▲
//!               ▼                          graph.json  *.ref.json
//!        degraded document                 / graph db
//! ```
//!
//! Only the manifest and, when listed, the metadata component are required.
//! The description, graph, and file descriptors are best-effort: a failed
//! fetch is logged and the record is produced without that data.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, GraphSource};
use crate::error::RetrievalError;
use crate::models::{
    EntityManifest, ExportOutcome, DESCRIPTION_COMPONENT, GRAPH_COMPONENT, METADATA_COMPONENT,
    REF_SUFFIX,
};
use crate::mods::{
    annotate, crosswalk, link, render, AnnotationMode, ComponentFilter, CrosswalkContext,
    LinkOptions, NormalizedDocument,
};
use crate::source::{RefDescriptor, RelationshipGraph, SourceMetadataRecord};
use crate::store::ObjectStore;

/// Result of processing one entity.
#[derive(Debug, Clone)]
pub struct ProcessedEntity {
    pub outcome: ExportOutcome,
    /// Rendered fragment; `None` exactly when the outcome is an error.
    pub fragment: Option<String>,
}

/// Shared, read-only per-job state handed to every worker task.
pub struct EntityProcessor {
    store: Arc<dyn ObjectStore>,
    ctx: CrosswalkContext,
    link: LinkOptions,
    annotation: AnnotationMode,
    graph_source: GraphSource,
}

impl EntityProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Result<Self> {
        let components = ComponentFilter::new(&config.export.link_components)
            .context("Invalid export.link_components pattern")?;
        Ok(Self {
            store,
            ctx: CrosswalkContext {
                institution: config.institution.name.clone(),
                view_base_url: config.institution.view_base_url.clone(),
                store_base_url: config.store.base_url.clone(),
                long_text_limit: config.export.ocr_truncate_chars,
                exported_at: Utc::now(),
            },
            link: LinkOptions {
                components,
                include_ocr: config.export.include_ocr,
            },
            annotation: config.export.annotation,
            graph_source: config.export.graph_source,
        })
    }

    /// Process `pi`, classifying every failure instead of returning it.
    pub async fn process(&self, pi: &str) -> ProcessedEntity {
        match self.build(pi).await {
            Ok(processed) => processed,
            Err(e) => {
                let not_found = e
                    .downcast_ref::<RetrievalError>()
                    .is_some_and(RetrievalError::is_not_found);
                if not_found {
                    tracing::warn!(pi, "entity not found: {:#}", e);
                } else {
                    tracing::warn!(pi, "entity failed: {:#}", e);
                }
                ProcessedEntity {
                    outcome: ExportOutcome::error(pi, format!("{:#}", e)),
                    fragment: None,
                }
            }
        }
    }

    /// Render `pi` as a standalone fragment without traversing its children.
    pub async fn preview(&self, pi: &str) -> Result<String> {
        let manifest = self.store.fetch_manifest(pi).await?;
        let (doc, _) = self.document(&manifest).await?;
        render(&doc)
    }

    async fn build(&self, pi: &str) -> Result<ProcessedEntity> {
        let manifest = self.store.fetch_manifest(pi).await?;
        tracing::debug!(
            pi,
            ver = manifest.ver,
            components = manifest.components.len(),
            "fetched manifest"
        );

        let (doc, complete) = self.document(&manifest).await?;
        let fragment = render(&doc).with_context(|| format!("rendering record for {}", pi))?;

        let children = manifest.children().to_vec();
        let outcome = if complete {
            ExportOutcome::success(pi, children)
        } else {
            tracing::info!(pi, "no {} component, writing incomplete record", METADATA_COMPONENT);
            ExportOutcome::incomplete(
                pi,
                children,
                format!("missing {} component", METADATA_COMPONENT),
            )
        };
        Ok(ProcessedEntity {
            outcome,
            fragment: Some(fragment),
        })
    }

    /// Build the normalized document; the flag is `false` for a degraded record.
    async fn document(
        &self,
        manifest: &EntityManifest,
    ) -> Result<(NormalizedDocument, bool), RetrievalError> {
        let record = self.metadata(manifest).await?;

        let Some(record) = record else {
            let mut doc = crosswalk(None, manifest, None, &self.ctx);
            doc.related_items = link(manifest, &HashMap::new(), &self.link, &self.ctx);
            return Ok((doc, false));
        };

        let description = if self.link.include_ocr {
            self.description(manifest).await
        } else {
            None
        };
        let mut doc = crosswalk(Some(&record), manifest, description.as_deref(), &self.ctx);

        if self.annotation != AnnotationMode::Skip {
            if let Some(graph) = self.graph(manifest).await {
                doc.apply_annotations(annotate(&graph, self.annotation));
            }
        }

        let descriptors = self.descriptors(manifest).await;
        doc.related_items = link(manifest, &descriptors, &self.link, &self.ctx);
        Ok((doc, true))
    }

    async fn metadata(
        &self,
        manifest: &EntityManifest,
    ) -> Result<Option<SourceMetadataRecord>, RetrievalError> {
        let Some(cid) = manifest.component(METADATA_COMPONENT) else {
            return Ok(None);
        };
        let bytes = self.store.fetch_component(cid).await?;
        let what = format!("{} of {}", METADATA_COMPONENT, manifest.pi);
        SourceMetadataRecord::parse(&bytes, &what).map(Some)
    }

    async fn description(&self, manifest: &EntityManifest) -> Option<String> {
        let cid = manifest.component(DESCRIPTION_COMPONENT)?;
        match self.store.fetch_text(cid).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(pi = %manifest.pi, error = %e, "skipping description");
                None
            }
        }
    }

    async fn graph(&self, manifest: &EntityManifest) -> Option<RelationshipGraph> {
        let from_db = if self.graph_source.uses_graphdb() {
            match self.store.fetch_entity_graph(&manifest.pi).await {
                Ok(graph) => graph,
                Err(e) => {
                    tracing::warn!(pi = %manifest.pi, error = %e, "graph database lookup failed");
                    None
                }
            }
        } else {
            None
        };

        let embedded = match manifest.component(GRAPH_COMPONENT) {
            Some(cid) if self.graph_source.uses_embedded() => {
                let what = format!("{} of {}", GRAPH_COMPONENT, manifest.pi);
                let parsed = self
                    .store
                    .fetch_component(cid)
                    .await
                    .and_then(|bytes| RelationshipGraph::parse(&bytes, &what));
                match parsed {
                    Ok(graph) => Some(graph),
                    Err(e) => {
                        tracing::warn!(pi = %manifest.pi, error = %e, "skipping embedded graph");
                        None
                    }
                }
            }
            _ => None,
        };

        let graph = match (from_db, embedded) {
            (Some(db), Some(embedded)) => Some(db.merge(embedded)),
            (db, embedded) => db.or(embedded),
        };
        graph.filter(|g| !g.is_empty())
    }

    async fn descriptors(&self, manifest: &EntityManifest) -> HashMap<String, RefDescriptor> {
        let wanted = manifest
            .components
            .iter()
            .filter(|(name, _)| name.ends_with(REF_SUFFIX) && self.link.components.selects(name));

        let fetches = wanted.map(|(name, cid)| async move {
            let what = format!("{} of {}", name, manifest.pi);
            let parsed = self
                .store
                .fetch_component(cid)
                .await
                .and_then(|bytes| RefDescriptor::parse(&bytes, &what));
            (name, parsed)
        });

        let mut out = HashMap::new();
        for (name, parsed) in join_all(fetches).await {
            match parsed {
                Ok(desc) => {
                    out.insert(name.clone(), desc);
                }
                Err(e) => {
                    tracing::warn!(pi = %manifest.pi, component = %name, error = %e, "skipping file descriptor")
                }
            }
        }
        out
    }
}
