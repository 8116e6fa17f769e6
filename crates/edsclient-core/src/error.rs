//! Errors surfaced to callers of the search backend.
//!
//! Remote failures are wrapped here so callers match on a kind and a numeric
//! code rather than on the shapes of the EDS API responses.

use std::fmt;

use thiserror::Error;

use crate::api::ApiError;

/// Which remote service rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Authentication,
    Session,
    Api,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteErrorKind::Authentication => "EDS authentication",
            RemoteErrorKind::Session => "EDS session",
            RemoteErrorKind::Api => "EDS API",
        })
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No usable EDS credentials: {0}")]
    AuthConfiguration(String),

    #[error("Retrieval id is not in the correct format: {0:?}")]
    InvalidIdentifier(String),

    #[error("{kind} error {code}: {description}")]
    Remote {
        kind: RemoteErrorKind,
        code: i64,
        description: String,
    },

    #[error("Transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl BackendError {
    /// The remote error number, when the failure was reported by EDS.
    pub fn code(&self) -> Option<i64> {
        match self {
            BackendError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ApiError> for BackendError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RemoteAuth { code, description } => BackendError::Remote {
                kind: RemoteErrorKind::Authentication,
                code,
                description,
            },
            ApiError::RemoteSession { code, description } => BackendError::Remote {
                kind: RemoteErrorKind::Session,
                code,
                description,
            },
            ApiError::RemoteApi { code, description } => BackendError::Remote {
                kind: RemoteErrorKind::Api,
                code,
                description,
            },
            ApiError::Timeout(e) => BackendError::Transport {
                message: e.to_string(),
                timed_out: true,
            },
            ApiError::NetworkError(e) => BackendError::Transport {
                message: e.to_string(),
                timed_out: false,
            },
            ApiError::InvalidRequest(msg) => BackendError::Transport {
                message: msg,
                timed_out: false,
            },
            ApiError::InvalidResponse(msg) => BackendError::InvalidResponse(msg),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Storage(err.into())
    }
}
