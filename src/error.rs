use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the cluster state provider and the diagnostic engine.
#[derive(Error, Debug)]
pub enum DiagnosticError {
    /// The requested object does not exist in the cluster.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// An optional capability (node metrics) is not available.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The per-request deadline expired before the report was complete.
    #[error("report deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Unexpected provider failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DiagnosticError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound { kind, name: name.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convert a kube client error for a named object, mapping HTTP 404 to `NotFound`.
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::not_found(kind, name),
            other => Self::Internal(format!("{} {}: {}", kind, name, other)),
        }
    }
}

impl From<kube::Error> for DiagnosticError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::NotFound {
                kind: "object",
                name: resp.message,
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiagnosticError>;
