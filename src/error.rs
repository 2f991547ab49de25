use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncErrorKind {
    Network,
    Authentication,
    RemoteRejection,
    /// The operation is not supported for the target site.
    Capability,
    MalformedResponse,
    /// The local cache failed to read or write.
    Storage,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::Network => "network",
            SyncErrorKind::Authentication => "authentication",
            SyncErrorKind::RemoteRejection => "remote_rejection",
            SyncErrorKind::Capability => "capability",
            SyncErrorKind::MalformedResponse => "malformed_response",
            SyncErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carried on a change-event when the originating action failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self::new(SyncErrorKind::Storage, format!("{err:#}"))
    }

    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::Capability, message)
    }
}

/// Failure of a single remote round trip.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("remote rejected request ({code}): {message}")]
    RemoteRejection { code: String, message: String },
    #[error("unsupported for this site: {0}")]
    Capability(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure to construct a client from its settings; never attached to an event.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid API base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            ClientError::Network(_) => SyncErrorKind::Network,
            ClientError::Authentication(_) => SyncErrorKind::Authentication,
            ClientError::RemoteRejection { .. } => SyncErrorKind::RemoteRejection,
            ClientError::Capability(_) => SyncErrorKind::Capability,
            ClientError::MalformedResponse(_) => SyncErrorKind::MalformedResponse,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::MalformedResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::MalformedResponse(err.to_string())
    }
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        let kind = err.kind();
        let message = match err {
            ClientError::RemoteRejection { code, message } => format!("{code}: {message}"),
            ClientError::Network(m)
            | ClientError::Authentication(m)
            | ClientError::Capability(m)
            | ClientError::MalformedResponse(m) => m,
        };
        SyncError::new(kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_keeps_kind() {
        let err: SyncError = ClientError::RemoteRejection {
            code: "unknown_theme".into(),
            message: "Theme not found".into(),
        }
        .into();
        assert_eq!(err.kind, SyncErrorKind::RemoteRejection);
        assert_eq!(err.message, "unknown_theme: Theme not found");

        let err: SyncError = ClientError::Authentication("invalid token".into()).into();
        assert_eq!(err.kind, SyncErrorKind::Authentication);
    }

    #[test]
    fn storage_error_includes_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("failed to insert theme");
        let err = SyncError::storage(inner);
        assert_eq!(err.kind, SyncErrorKind::Storage);
        assert!(err.message.contains("failed to insert theme"));
        assert!(err.message.contains("disk full"));
    }
}
