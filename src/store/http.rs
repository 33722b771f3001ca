//! HTTP client for the upstream store.
//!
//! # Endpoints
//!
//! | Request | URL |
//! |---------|-----|
//! | manifest | `GET {base_url}/entities/{pi}` |
//! | component | `GET {base_url}/cat/{cid}` |
//! | graph | `GET {graph_url}/entities/{pi}/graph` |
//!
//! # Retry Strategy
//!
//! - HTTP 404 → [`RetrievalError::NotFound`], no retry
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, ... (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use super::ObjectStore;
use crate::config::StoreConfig;
use crate::error::RetrievalError;
use crate::models::EntityManifest;
use crate::source::RelationshipGraph;

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    graph_url: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            graph_url: config
                .graph_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Shorten the retry backoff; used by tests against a local server.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn get(&self, url: &str, what: &str) -> Result<Vec<u8>, RetrievalError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_base * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .bytes()
                            .await
                            .map(|b| b.to_vec())
                            .map_err(|e| RetrievalError::Network {
                                what: what.to_string(),
                                message: e.to_string(),
                            });
                    }

                    if status.as_u16() == 404 {
                        return Err(RetrievalError::NotFound {
                            what: what.to_string(),
                        });
                    }

                    let body = response.text().await.unwrap_or_default();
                    let err = RetrievalError::Status {
                        what: what.to_string(),
                        status: status.as_u16(),
                        body,
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::debug!(url, attempt, status = status.as_u16(), "retrying store request");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "store request failed");
                    last_err = Some(RetrievalError::Network {
                        what: what.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RetrievalError::Network {
            what: what.to_string(),
            message: "no attempts made".to_string(),
        }))
    }
}

/// Append `segments` to `base`, percent-encoding each one so identifiers
/// containing `/`, `?` or `#` address the intended resource.
fn endpoint(base: &str, segments: &[&str], what: &str) -> Result<reqwest::Url, RetrievalError> {
    let invalid = |message: String| RetrievalError::Network {
        what: what.to_string(),
        message,
    };
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| invalid(format!("invalid store URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("store URL {} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn fetch_manifest(&self, pi: &str) -> Result<EntityManifest, RetrievalError> {
        let what = format!("manifest for {}", pi);
        let url = endpoint(&self.base_url, &["entities", pi], &what)?;
        let bytes = self.get(url.as_str(), &what).await?;
        serde_json::from_slice(&bytes).map_err(|e| RetrievalError::malformed(what, e))
    }

    async fn fetch_component(&self, cid: &str) -> Result<Vec<u8>, RetrievalError> {
        let what = format!("component {}", cid);
        let url = endpoint(&self.base_url, &["cat", cid], &what)?;
        self.get(url.as_str(), &what).await
    }

    async fn fetch_entity_graph(
        &self,
        pi: &str,
    ) -> Result<Option<RelationshipGraph>, RetrievalError> {
        let Some(graph_url) = &self.graph_url else {
            return Ok(None);
        };
        let what = format!("graph for {}", pi);
        let url = endpoint(graph_url, &["entities", pi, "graph"], &what)?;
        match self.get(url.as_str(), &what).await {
            Ok(bytes) => RelationshipGraph::parse(&bytes, &what).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_each_segment() {
        let url = endpoint("http://store.test/api", &["entities", "a/b?c#d"], "m").unwrap();
        assert_eq!(url.as_str(), "http://store.test/api/entities/a%2Fb%3Fc%23d");

        let url = endpoint("http://store.test", &["cat", "bafy 1"], "c").unwrap();
        assert_eq!(url.as_str(), "http://store.test/cat/bafy%201");
    }

    #[test]
    fn unusable_base_is_a_retrieval_error() {
        let err = endpoint("not a url", &["entities", "x"], "manifest for x").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("manifest for x"));
    }
}
