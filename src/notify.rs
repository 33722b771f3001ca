//! Completion notification.
//!
//! Called at most once per job, after the writer has closed. A failed
//! notification is logged and otherwise ignored: it never changes the job's
//! result or exit status.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::summary::ExportSummary;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome payload delivered to a [`Notifier`].
#[derive(Debug, Clone)]
pub enum JobReport<'a> {
    Completed(&'a ExportSummary),
    Failed { root_pi: &'a str, error: String },
}

impl JobReport<'_> {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            JobReport::Completed(summary) => serde_json::json!({
                "status": if summary.cancelled { "cancelled" } else { "success" },
                "summary": summary,
            }),
            JobReport::Failed { root_pi, error } => serde_json::json!({
                "status": "error",
                "root_pi": root_pi,
                "error": error,
            }),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &JobReport<'_>) -> Result<(), NotifyError>;
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _report: &JobReport<'_>) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// POSTs the report as JSON to a fixed URL. Not retried.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &JobReport<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&report.to_json())
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Build the notifier for `config`; a webhook that cannot be set up degrades to no-op.
pub fn notifier_from_config(config: &NotifyConfig) -> Box<dyn Notifier> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => match WebhookNotifier::new(url) {
            Ok(n) => Box::new(n),
            Err(e) => {
                tracing::warn!(error = %e, "webhook notifier unavailable");
                Box::new(NoopNotifier)
            }
        },
        _ => Box::new(NoopNotifier),
    }
}

/// Deliver `report`, logging (never returning) any failure.
pub async fn notify_quietly(notifier: &dyn Notifier, report: &JobReport<'_>) {
    if let Err(e) = notifier.notify(report).await {
        tracing::warn!(error = %e, "completion notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(AtomicUsize);

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _report: &JobReport<'_>) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Status(503))
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let n = Failing(AtomicUsize::new(0));
        let report = JobReport::Failed {
            root_pi: "01X",
            error: "disk full".to_string(),
        };
        notify_quietly(&n, &report).await;
        assert_eq!(n.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_payload_shape() {
        let v = JobReport::Failed {
            root_pi: "01X",
            error: "disk full".to_string(),
        }
        .to_json();
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "disk full");
    }

    #[tokio::test]
    async fn unconfigured_is_noop() {
        let report = JobReport::Failed {
            root_pi: "01X",
            error: "disk full".to_string(),
        };
        for config in [
            NotifyConfig::default(),
            NotifyConfig {
                webhook_url: Some("  ".to_string()),
            },
        ] {
            assert!(notifier_from_config(&config).notify(&report).await.is_ok());
        }

        // A configured webhook really sends, so an unreachable one fails.
        let configured = notifier_from_config(&NotifyConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".to_string()),
        });
        assert!(configured.notify(&report).await.is_err());
    }
}
