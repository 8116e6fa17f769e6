use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// EDS error number: authentication token invalid or expired.
pub const AUTH_TOKEN_INVALID: i64 = 104;

/// EDS error number: session token missing or unknown.
pub const SESSION_TOKEN_MISSING: i64 = 108;

/// EDS error number: session token invalid or expired.
pub const SESSION_TOKEN_INVALID: i64 = 109;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// The remote operations exposed by the EDS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Authenticate,
    CreateSession,
    Search,
    Retrieve,
    Info,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Authenticate => "Authenticate",
            Operation::CreateSession => "CreateSession",
            Operation::Search => "Search",
            Operation::Retrieve => "Retrieve",
            Operation::Info => "Info",
        };
        f.write_str(name)
    }
}

/// Which credential a remote error reports as unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Authentication,
    Session,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication rejected ({code}): {description}")]
    RemoteAuth { code: i64, description: String },

    #[error("Session creation rejected ({code}): {description}")]
    RemoteSession { code: i64, description: String },

    #[error("EDS API error {code}: {description}")]
    RemoteApi { code: i64, description: String },

    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Network error: {0}")]
    NetworkError(#[source] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err)
        } else {
            ApiError::NetworkError(err)
        }
    }
}

/// Error body returned by the EDS API endpoints.
#[derive(Debug, Default, Deserialize)]
struct EdsErrorBody {
    #[serde(rename = "ErrorNumber")]
    error_number: Option<Value>,
    #[serde(rename = "ErrorDescription")]
    error_description: Option<String>,
    #[serde(rename = "DetailedErrorDescription")]
    detailed_error_description: Option<String>,
}

/// Error body returned by the authentication service.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(rename = "ErrorCode")]
    error_code: Option<Value>,
    #[serde(rename = "Reason")]
    reason: Option<String>,
    #[serde(rename = "AdditionalDetail")]
    additional_detail: Option<String>,
}

/// EDS encodes numbers as either JSON numbers or strings depending on the endpoint.
pub(crate) fn lenient_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn join_description(summary: Option<String>, detail: Option<String>) -> String {
    let summary = summary.unwrap_or_default();
    match detail.filter(|d| !d.trim().is_empty()) {
        Some(detail) if !summary.is_empty() => format!("{}: {}", summary, detail),
        Some(detail) => detail,
        None => summary,
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Classify a non-success response from `operation`.
    ///
    /// Bodies carrying an EDS error number become one of the `Remote*`
    /// variants; anything else is reported as an invalid response.
    pub fn from_response(operation: Operation, status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = match operation {
            Operation::Authenticate => serde_json::from_str::<AuthErrorBody>(body)
                .ok()
                .and_then(|b| {
                    lenient_i64(b.error_code.as_ref())
                        .map(|code| (code, join_description(b.reason, b.additional_detail)))
                }),
            _ => serde_json::from_str::<EdsErrorBody>(body).ok().and_then(|b| {
                lenient_i64(b.error_number.as_ref()).map(|code| {
                    (
                        code,
                        join_description(b.error_description, b.detailed_error_description),
                    )
                })
            }),
        };

        match parsed {
            Some((code, description)) => Self::remote(operation, code, description),
            None => ApiError::InvalidResponse(format!(
                "{} returned status {}: {}",
                operation,
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// Build the remote error variant that `operation` reports.
    pub fn remote(operation: Operation, code: i64, description: impl Into<String>) -> Self {
        let description = description.into();
        match operation {
            Operation::Authenticate => ApiError::RemoteAuth { code, description },
            Operation::CreateSession => ApiError::RemoteSession { code, description },
            _ => ApiError::RemoteApi { code, description },
        }
    }

    /// The remote error number, if the failure came from the EDS service.
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::RemoteAuth { code, .. }
            | ApiError::RemoteSession { code, .. }
            | ApiError::RemoteApi { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The credential this error reports as invalid, if it is one of the
    /// invalidation codes that warrant a refresh-and-retry.
    pub fn invalid_credential(&self) -> Option<Credential> {
        match self {
            ApiError::RemoteApi { code, .. } | ApiError::RemoteSession { code, .. } => match *code {
                AUTH_TOKEN_INVALID => Some(Credential::Authentication),
                SESSION_TOKEN_MISSING | SESSION_TOKEN_INVALID => Some(Credential::Session),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn invalid_body(operation: Operation, err: serde_json::Error, body: &str) -> Self {
        ApiError::InvalidResponse(format!(
            "Failed to parse {} response ({}): {}",
            operation,
            err,
            Self::truncate_body(body)
        ))
    }
}
