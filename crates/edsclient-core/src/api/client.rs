//! HTTP client for the EDS REST API.
//!
//! [`EdsTransport`] is the seam the token manager and the retry logic talk
//! to; [`EdsApiClient`] is the `reqwest` implementation of it.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::EdsConfig;
use crate::search::SearchRequestModel;

use super::error::{lenient_i64, Operation};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

// Header names are case-insensitive on the wire; `HeaderMap` needs them lowercase.
const AUTH_TOKEN_HEADER: &str = "x-authenticationtoken";
const SESSION_TOKEN_HEADER: &str = "x-sessiontoken";

/// Result of a successful Authenticate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    /// Seconds until the token expires, counted from issue time.
    pub timeout_secs: i64,
}

#[derive(Debug, Deserialize)]
struct RawAuthResponse {
    #[serde(rename = "AuthToken")]
    auth_token: String,
    #[serde(rename = "AuthTimeout")]
    auth_timeout: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    #[serde(rename = "UserId")]
    user_id: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
    #[serde(rename = "InterfaceId", skip_serializing_if = "Option::is_none")]
    interface_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    #[serde(rename = "Profile")]
    profile: &'a str,
    #[serde(rename = "Guest")]
    guest: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    #[serde(rename = "SessionToken")]
    session_token: String,
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    #[serde(rename = "DbId")]
    db_id: &'a str,
    #[serde(rename = "An")]
    an: &'a str,
    #[serde(rename = "HighlightTerms", skip_serializing_if = "Option::is_none")]
    highlight_terms: Option<&'a str>,
}

/// The remote operations of the EDS API.
///
/// `auth_token` is `None` when the account uses IP authentication; the
/// authentication header is then omitted.
#[async_trait]
pub trait EdsTransport: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        org_id: Option<&str>,
    ) -> Result<AuthResponse, ApiError>;

    /// Open a session for `profile`, returning the session token.
    async fn create_session(
        &self,
        profile: &str,
        guest: bool,
        auth_token: Option<&str>,
    ) -> Result<String, ApiError>;

    async fn search(
        &self,
        request: &SearchRequestModel,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError>;

    async fn retrieve(
        &self,
        an: &str,
        db_id: &str,
        highlight_terms: &str,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError>;

    async fn info(&self, auth_token: Option<&str>, session_token: &str) -> Result<Value, ApiError>;
}

/// API client for EDS.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct EdsApiClient {
    client: Client,
    api_base_url: String,
    auth_base_url: String,
}

impl EdsApiClient {
    /// Create a client using the endpoints and timeout from `config`.
    pub fn new(config: &EdsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_base_url: config.auth_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }

    fn token_headers(
        auth_token: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            headers.insert(
                AUTH_TOKEN_HEADER,
                header::HeaderValue::from_str(token)
                    .map_err(|e| ApiError::InvalidRequest(format!("authentication token: {}", e)))?,
            );
        }
        if let Some(token) = session_token.filter(|t| !t.is_empty()) {
            headers.insert(
                SESSION_TOKEN_HEADER,
                header::HeaderValue::from_str(token)
                    .map_err(|e| ApiError::InvalidRequest(format!("session token: {}", e)))?,
            );
        }
        Ok(headers)
    }

    /// Read the body of `response`, classifying non-success statuses.
    async fn read_response<T: DeserializeOwned>(
        operation: Operation,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_response(operation, status, &body));
        }
        serde_json::from_str(&body).map_err(|e| ApiError::invalid_body(operation, e, &body))
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        operation: Operation,
        url: &str,
        headers: header::HeaderMap,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(%operation, url, "EDS request");
        let response = self.client.post(url).headers(headers).json(body).send().await?;
        Self::read_response(operation, response).await
    }
}

#[async_trait]
impl EdsTransport for EdsApiClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        org_id: Option<&str>,
    ) -> Result<AuthResponse, ApiError> {
        let url = format!("{}/uidauth", self.auth_base_url);
        let request = AuthRequest {
            user_id: username,
            password,
            interface_id: org_id,
        };
        let raw: RawAuthResponse = self
            .post(
                Operation::Authenticate,
                &url,
                Self::token_headers(None, None)?,
                &request,
            )
            .await?;

        let timeout_secs = lenient_i64(raw.auth_timeout.as_ref()).ok_or_else(|| {
            ApiError::InvalidResponse("Authenticate response is missing AuthTimeout".to_string())
        })?;

        Ok(AuthResponse {
            token: raw.auth_token,
            timeout_secs,
        })
    }

    async fn create_session(
        &self,
        profile: &str,
        guest: bool,
        auth_token: Option<&str>,
    ) -> Result<String, ApiError> {
        let request = CreateSessionRequest {
            profile,
            guest: if guest { "y" } else { "n" },
        };
        let response: CreateSessionResponse = self
            .post(
                Operation::CreateSession,
                &self.api_url("CreateSession"),
                Self::token_headers(auth_token, None)?,
                &request,
            )
            .await?;
        Ok(response.session_token)
    }

    async fn search(
        &self,
        request: &SearchRequestModel,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError> {
        self.post(
            Operation::Search,
            &self.api_url("Search"),
            Self::token_headers(auth_token, Some(session_token))?,
            request,
        )
        .await
    }

    async fn retrieve(
        &self,
        an: &str,
        db_id: &str,
        highlight_terms: &str,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError> {
        let request = RetrieveRequest {
            db_id,
            an,
            highlight_terms: Some(highlight_terms).filter(|t| !t.is_empty()),
        };
        self.post(
            Operation::Retrieve,
            &self.api_url("Retrieve"),
            Self::token_headers(auth_token, Some(session_token))?,
            &request,
        )
        .await
    }

    async fn info(&self, auth_token: Option<&str>, session_token: &str) -> Result<Value, ApiError> {
        let url = self.api_url("Info");
        debug!(operation = %Operation::Info, url = %url, "EDS request");
        let response = self
            .client
            .get(&url)
            .headers(Self::token_headers(auth_token, Some(session_token))?)
            .send()
            .await?;
        Self::read_response(Operation::Info, response).await
    }
}

// ============================================================================
// Tests
// ============================================================================
