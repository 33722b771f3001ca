//! Error taxonomy for the export pipeline.
//!
//! Errors are split by the scope at which they are handled:
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`RetrievalError`] | one entity | recorded in the summary, traversal continues |
//! | [`SinkError`] | whole job | aborts the traversal, propagates to the caller |
//! | [`NotifyError`] | whole job | logged only |
//!
//! A missing primary metadata component is not an error at all: it produces
//! an "incomplete" record (see [`crate::models::OutcomeStatus::Incomplete`]).

use thiserror::Error;

/// An upstream fetch failed for a single entity or component.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("store returned HTTP {status} for {what}: {body}")]
    Status {
        what: String,
        status: u16,
        body: String,
    },

    #[error("network error fetching {what}: {message}")]
    Network { what: String, message: String },

    #[error("malformed payload for {what}: {message}")]
    Malformed { what: String, message: String },
}

impl RetrievalError {
    /// `true` for a 404-style miss, which is logged differently from other failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RetrievalError::NotFound { .. })
    }

    pub fn malformed(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RetrievalError::Malformed {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

/// The output sink failed. Always fatal for the job.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open sink {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to sink: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to close sink: {0}")]
    Close(#[source] std::io::Error),

    #[error("collection writer is not open")]
    NotOpen,
}

/// The completion notifier could not deliver its payload.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier request failed: {0}")]
    Request(String),

    #[error("notifier returned HTTP {0}")]
    Status(u16),
}

/// Job-level failure returned by [`crate::traverse::Exporter::run`].
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Sink(#[from] SinkError),
}
