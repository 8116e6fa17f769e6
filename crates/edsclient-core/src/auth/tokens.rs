use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiError, Credential, EdsTransport};
use crate::cache::CredentialCache;
use crate::config::AccountIdentity;
use crate::error::BackendError;
use crate::models::InfoPayload;

use super::session::{SessionStore, INFO_KEY, PROFILE_ID_KEY, SESSION_ID_KEY};

/// Credential cache key of the shared authentication token.
pub const AUTH_TOKEN_CACHE_KEY: &str = "edsAuthenticationToken";

/// Buffer time before expiry during which a token is no longer handed out (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthenticationToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the token may still be used at `now`: non-empty and not
    /// within the refresh buffer of its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty()
            && self
                .expires_at
                .checked_sub_signed(Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
                .is_some_and(|refresh_at| now <= refresh_at)
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub profile_id: String,
}

/// Obtains, caches and invalidates the authentication and session tokens.
///
/// The authentication token lives in the shared [`CredentialCache`]; the
/// session token lives in the caller's [`SessionStore`].
#[derive(Clone)]
pub struct TokenManager {
    transport: Arc<dyn EdsTransport>,
    account: Arc<AccountIdentity>,
    credential_cache: Arc<dyn CredentialCache>,
    session_store: Arc<dyn SessionStore>,
    debug_tokens: bool,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn EdsTransport>,
        account: Arc<AccountIdentity>,
        credential_cache: Arc<dyn CredentialCache>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            transport,
            account,
            credential_cache,
            session_store,
            debug_tokens: false,
        }
    }

    /// Log token values verbatim instead of redacting them.
    pub fn with_debug_tokens(mut self, enabled: bool) -> Self {
        self.debug_tokens = enabled;
        self
    }

    /// A manager sharing everything but the session store.
    pub fn with_session_store(&self, session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            session_store,
            ..self.clone()
        }
    }

    pub fn account(&self) -> &AccountIdentity {
        &self.account
    }

    fn loggable<'a>(&self, token: &'a str) -> &'a str {
        if self.debug_tokens {
            token
        } else {
            "<redacted>"
        }
    }

    fn cached_authentication_token(&self) -> Result<Option<AuthenticationToken>, BackendError> {
        let Some(raw) = self.credential_cache.get(AUTH_TOKEN_CACHE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<AuthenticationToken>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cached authentication token");
                Ok(None)
            }
        }
    }

    /// The authentication token to send with requests.
    ///
    /// Returns `None` for IP-authenticated accounts. With `force_refresh`
    /// the cached token is dropped and a new one is always requested.
    pub async fn authentication_token(
        &self,
        force_refresh: bool,
    ) -> Result<Option<AuthenticationToken>, BackendError> {
        if self.account.ip_auth {
            debug!("IP authentication configured, no authentication token needed");
            return Ok(None);
        }

        if force_refresh {
            debug!("Invalidating cached authentication token");
            self.credential_cache.delete(AUTH_TOKEN_CACHE_KEY)?;
        }

        if let Some(cached) = self.cached_authentication_token()? {
            debug!(
                token = self.loggable(&cached.value),
                expires_at = %cached.expires_at,
                "Cached authentication token"
            );
            if cached.is_usable() {
                return Ok(Some(cached));
            }
        }

        let (username, password) = self.account.credentials().ok_or_else(|| {
            BackendError::AuthConfiguration(
                "no username/password configured and IP authentication is off".to_string(),
            )
        })?;

        debug!(username, org_id = ?self.account.org_id, "Calling Authenticate");
        let response = self
            .transport
            .authenticate(username, password, self.account.org_id.as_deref())
            .await?;

        let expires_at = Some(response.timeout_secs)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!(
                    "AuthTimeout out of range: {}",
                    response.timeout_secs
                ))
            })?;
        let token = AuthenticationToken::new(response.token, expires_at);
        self.credential_cache
            .set(AUTH_TOKEN_CACHE_KEY, &serde_json::to_string(&token)?)?;
        debug!(
            token = self.loggable(&token.value),
            expires_at = %token.expires_at,
            "New authentication token cached"
        );
        Ok(Some(token))
    }

    fn effective_profile(&self, profile_override: Option<&str>) -> Result<String, BackendError> {
        profile_override
            .or(self.account.profile.as_deref())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BackendError::AuthConfiguration("no EDS profile configured".to_string()))
    }

    fn stored_session(&self) -> Result<Option<SessionToken>, BackendError> {
        let Some(value) = self.session_store.get(SESSION_ID_KEY)?.filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };
        let profile_id = self.session_store.get(PROFILE_ID_KEY)?.unwrap_or_default();
        Ok(Some(SessionToken { value, profile_id }))
    }

    /// The session token to send with requests.
    ///
    /// A stored session is reused unless `force_refresh` is set or it was
    /// created for a profile other than the effective one. `profile_override`
    /// applies to this call only.
    pub async fn session_token(
        &self,
        force_refresh: bool,
        profile_override: Option<&str>,
    ) -> Result<SessionToken, BackendError> {
        let profile = self.effective_profile(profile_override)?;

        if !force_refresh {
            if let Some(existing) = self.stored_session()? {
                if existing.profile_id == profile {
                    debug!(session = self.loggable(&existing.value), "SessionToken to use");
                    return Ok(existing);
                }
                debug!(
                    stored = %existing.profile_id,
                    requested = %profile,
                    "Profile changed, creating a new session"
                );
            }
        }

        self.create_session(&profile).await
    }

    /// Open a session for `profile`, store it, and fetch the search criteria
    /// that go with it.
    async fn create_session(&self, profile: &str) -> Result<SessionToken, BackendError> {
        let mut auth = self.authentication_token(false).await?;
        let guest = self.account.guest;

        let value = match self
            .transport
            .create_session(profile, guest, auth.as_ref().map(|t| t.value.as_str()))
            .await
        {
            Ok(value) => value,
            Err(err) if err.invalid_credential() == Some(Credential::Authentication) => {
                warn!(error = %err, "Authentication token rejected while creating session, retrying");
                auth = self.authentication_token(true).await?;
                self.transport
                    .create_session(profile, guest, auth.as_ref().map(|t| t.value.as_str()))
                    .await?
            }
            Err(err) => return Err(err.into()),
        };

        // Criteria of the previous session must not outlive it
        self.session_store.remove(INFO_KEY)?;
        self.session_store.set(SESSION_ID_KEY, &value)?;
        self.session_store.set(PROFILE_ID_KEY, profile)?;
        debug!(session = self.loggable(&value), profile, "New EDS session created");

        let info = self.fetch_info(auth, &value).await?;
        self.session_store
            .set(INFO_KEY, &serde_json::to_string(&info)?)?;

        Ok(SessionToken {
            value,
            profile_id: profile.to_string(),
        })
    }

    /// Info call made while creating a session. Only the authentication axis
    /// is retried here, since the session was just created.
    async fn fetch_info(
        &self,
        auth: Option<AuthenticationToken>,
        session: &str,
    ) -> Result<Value, BackendError> {
        let token = auth.as_ref().map(|t| t.value.as_str());
        match self.transport.info(token, session).await {
            Ok(info) => Ok(info),
            Err(err) if err.invalid_credential() == Some(Credential::Authentication) => {
                warn!(error = %err, "Authentication token rejected while fetching info, retrying");
                let refreshed = self.authentication_token(true).await?;
                let token = refreshed.as_ref().map(|t| t.value.as_str());
                self.transport
                    .info(token, session)
                    .await
                    .map_err(|e: ApiError| e.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Search criteria cached when the current session was created.
    pub fn search_criteria(&self) -> Result<Option<InfoPayload>, BackendError> {
        match self.session_store.get(INFO_KEY)? {
            Some(raw) => Ok(Some(InfoPayload::new(serde_json::from_str(&raw)?))),
            None => Ok(None),
        }
    }
}
