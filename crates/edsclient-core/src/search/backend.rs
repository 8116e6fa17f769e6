//! The EDS search backend.
//!
//! Every outward operation runs through [`EdsBackend::with_token_retry`]:
//! tokens come from the [`TokenManager`], and a remote report that one of
//! them is invalid (104 for the authentication token, 108/109 for the
//! session token) refreshes that one credential and repeats the call once.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::{ApiError, Credential, EdsApiClient, EdsTransport, Operation};
use crate::auth::{SessionStore, TokenManager};
use crate::cache::CredentialCache;
use crate::config::{AccountIdentity, EdsConfig};
use crate::error::BackendError;
use crate::models::{
    EdsRecordCollectionFactory, InfoPayload, RecordCollection, RecordCollectionFactory,
};

use super::params::{page_number, ParamBag, SearchRequestModel};
use super::query::{EdsQueryBuilder, Query, QueryBuilder};

/// Identifier stamped on every collection this backend returns.
pub const SOURCE_IDENTIFIER: &str = "EDS";

/// Per-call parameter selecting a profile other than the configured one.
pub const PROFILE_PARAM: &str = "profile";

/// Retrieve parameter carrying terms to highlight in the record.
pub const HIGHLIGHT_PARAM: &str = "highlight";

/// Split a `<dbId>,<accessionNumber>` identifier at its first comma.
pub fn parse_record_id(id: &str) -> Result<(&str, &str), BackendError> {
    match id.split_once(',') {
        Some((db_id, an)) if !db_id.is_empty() && !an.is_empty() => Ok((db_id, an)),
        _ => Err(BackendError::InvalidIdentifier(id.to_string())),
    }
}

/// Search backend for one caller session.
///
/// Clone is cheap: clones share the transport, the credential cache and
/// the session store.
#[derive(Clone)]
pub struct EdsBackend {
    transport: Arc<dyn EdsTransport>,
    tokens: TokenManager,
    query_builder: Arc<dyn QueryBuilder>,
    collection_factory: Arc<dyn RecordCollectionFactory>,
}

impl EdsBackend {
    pub fn new(
        transport: Arc<dyn EdsTransport>,
        account: AccountIdentity,
        credential_cache: Arc<dyn CredentialCache>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let tokens = TokenManager::new(
            transport.clone(),
            Arc::new(account),
            credential_cache,
            session_store,
        );
        Self {
            transport,
            tokens,
            query_builder: Arc::new(EdsQueryBuilder),
            collection_factory: Arc::new(EdsRecordCollectionFactory),
        }
    }

    /// Backend talking to the EDS endpoints named in `config`.
    pub fn from_config(
        config: &EdsConfig,
        account: AccountIdentity,
        credential_cache: Arc<dyn CredentialCache>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let client = EdsApiClient::new(config)?;
        Ok(Self::new(Arc::new(client), account, credential_cache, session_store)
            .with_debug_tokens(config.debug_tokens))
    }

    pub fn with_query_builder(mut self, query_builder: Arc<dyn QueryBuilder>) -> Self {
        self.query_builder = query_builder;
        self
    }

    pub fn with_collection_factory(mut self, factory: Arc<dyn RecordCollectionFactory>) -> Self {
        self.collection_factory = factory;
        self
    }

    pub fn with_debug_tokens(mut self, enabled: bool) -> Self {
        self.tokens = self.tokens.with_debug_tokens(enabled);
        self
    }

    /// A backend for another caller session, sharing everything else.
    pub fn with_session(&self, session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            tokens: self.tokens.with_session_store(session_store),
            ..self.clone()
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Run `call` with valid tokens, refreshing the credential it reports as
    /// invalid and calling it again at most once.
    ///
    /// `session` skips the session lookup for the first attempt.
    async fn with_token_retry<T, F, Fut>(
        &self,
        operation: Operation,
        profile: Option<&str>,
        session: Option<String>,
        call: F,
    ) -> Result<T, BackendError>
    where
        F: Fn(Option<String>, String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let auth = self
            .tokens
            .authentication_token(false)
            .await?
            .map(|t| t.value);
        let session = match session {
            Some(token) => token,
            None => self.tokens.session_token(false, profile).await?.value,
        };

        let err = match call(auth.clone(), session.clone()).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        match err.invalid_credential() {
            Some(Credential::Authentication) => {
                warn!(%operation, error = %err, "Authentication token rejected, refreshing");
                let auth = self
                    .tokens
                    .authentication_token(true)
                    .await?
                    .map(|t| t.value);
                Ok(call(auth, session).await?)
            }
            Some(Credential::Session) => {
                warn!(%operation, error = %err, "Session token rejected, refreshing");
                let session = self.tokens.session_token(true, profile).await?.value;
                Ok(call(auth, session).await?)
            }
            None => {
                debug!(%operation, error = %err, "EDS call failed");
                Err(err.into())
            }
        }
    }

    fn create_record_collection(
        &self,
        payload: serde_json::Value,
    ) -> Result<RecordCollection, BackendError> {
        let mut collection = self.collection_factory.factory(payload)?;
        collection.source_identifier = SOURCE_IDENTIFIER.to_string();
        Ok(collection)
    }

    /// Search for `query`, returning the page of `limit` results that
    /// contains `offset`.
    pub async fn search(
        &self,
        query: &Query,
        offset: usize,
        limit: usize,
        params: Option<&ParamBag>,
    ) -> Result<RecordCollection, BackendError> {
        debug!(
            query = %query.all_terms(),
            limit,
            offset,
            params = ?params.map(ParamBag::request),
            "EDS search"
        );

        let mut request = self.query_builder.build(query);
        if let Some(params) = params {
            request.merge_with(params);
        }
        let profile = request.remove(PROFILE_PARAM).and_then(|v| v.into_iter().next());
        request.set("resultsPerPage", limit.to_string());
        request.set("pageNumber", page_number(offset, limit).to_string());

        let model = SearchRequestModel::from_params(&request);
        debug!(request = %model.to_query_string(), "Search model");

        let transport = &self.transport;
        let model = &model;
        let payload = self
            .with_token_retry(
                Operation::Search,
                profile.as_deref(),
                None,
                move |auth, session| async move {
                    transport.search(model, auth.as_deref(), &session).await
                },
            )
            .await?;

        let mut collection = self.create_record_collection(payload)?;
        collection.offset = offset;
        Ok(collection)
    }

    /// Retrieve one record by its `<dbId>,<accessionNumber>` identifier.
    pub async fn retrieve(
        &self,
        id: &str,
        params: Option<&ParamBag>,
    ) -> Result<RecordCollection, BackendError> {
        let (db_id, an) = parse_record_id(id)?;
        let profile = params.and_then(|p| p.get_first(PROFILE_PARAM));
        let highlight_terms = params
            .map(|p| p.get(HIGHLIGHT_PARAM).join(" "))
            .unwrap_or_default();
        debug!(db_id, an, profile = ?profile, "EDS retrieve");

        let transport = &self.transport;
        let highlight_terms = highlight_terms.as_str();
        let payload = self
            .with_token_retry(
                Operation::Retrieve,
                profile,
                None,
                move |auth, session| async move {
                    transport
                        .retrieve(an, db_id, highlight_terms, auth.as_deref(), &session)
                        .await
                },
            )
            .await?;

        let record = payload.get("Record").cloned().unwrap_or(payload);
        self.create_record_collection(json!({ "Records": [record] }))
    }

    /// Fetch the Info payload, for `session_token` when given, otherwise for
    /// the caller's current session.
    pub async fn get_info(&self, session_token: Option<&str>) -> Result<InfoPayload, BackendError> {
        let transport = &self.transport;
        let payload = self
            .with_token_retry(
                Operation::Info,
                None,
                session_token.map(str::to_string),
                move |auth, session| async move { transport.info(auth.as_deref(), &session).await },
            )
            .await?;
        Ok(InfoPayload::new(payload))
    }

    /// Search criteria cached when the current session was created.
    pub fn search_criteria(&self) -> Result<Option<InfoPayload>, BackendError> {
        self.tokens.search_criteria()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::{AuthenticationToken, AUTH_TOKEN_CACHE_KEY};
    use crate::auth::{MemorySessionStore, PROFILE_ID_KEY, SESSION_ID_KEY};
    use crate::cache::MemoryCache;
    use crate::error::RemoteErrorKind;
    use crate::search::SearchOption;
    use crate::testing::ScriptedTransport;
    use chrono::{Duration, Utc};

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        cache: Arc<MemoryCache>,
        session: Arc<MemorySessionStore>,
        backend: EdsBackend,
    }

    /// A backend whose caches already hold a valid token and session, so
    /// only the calls under test reach the transport.
    fn warm_fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MemoryCache::new());
        let session = Arc::new(MemorySessionStore::new());

        let token = AuthenticationToken::new("cached-auth", Utc::now() + Duration::hours(1));
        cache
            .set(AUTH_TOKEN_CACHE_KEY, &serde_json::to_string(&token).unwrap())
            .unwrap();
        session.set(SESSION_ID_KEY, "cached-session").unwrap();
        session.set(PROFILE_ID_KEY, "edsapi").unwrap();

        let backend = EdsBackend::new(
            transport.clone(),
            AccountIdentity::with_credentials("lib", "secret", "edsapi"),
            cache.clone(),
            session.clone(),
        );
        Fixture {
            transport,
            cache,
            session,
            backend,
        }
    }

    #[test]
    fn test_parse_record_id() {
        assert_eq!(parse_record_id("123,ABC456").unwrap(), ("123", "ABC456"));
        assert_eq!(parse_record_id("a9h,an,with,commas").unwrap(), ("a9h", "an,with,commas"));
        for bad in ["malformed", ",ABC", "123,", ""] {
            assert!(matches!(
                parse_record_id(bad),
                Err(BackendError::InvalidIdentifier(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_search_success_uses_cached_tokens() {
        let f = warm_fixture();
        let collection = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap();

        assert_eq!(collection.total, 2);
        assert_eq!(collection.source_identifier, SOURCE_IDENTIFIER);
        assert_eq!(f.transport.remote_calls(), 1);

        let call = &f.transport.search_requests()[0];
        assert_eq!(call.auth_token.as_deref(), Some("cached-auth"));
        assert_eq!(call.session_token, "cached-session");
    }

    #[tokio::test]
    async fn test_search_pagination_and_flattening() {
        let f = warm_fixture();
        let mut params = ParamBag::new();
        params.add("filters", "SourceType:Journals");
        params.set("sort", "date");

        let collection = f
            .backend
            .search(&Query::keywords("rust"), 40, 20, Some(&params))
            .await
            .unwrap();
        assert_eq!(collection.offset, 40);

        let request = &f.transport.search_requests()[0].request;
        assert_eq!(request.get("pageNumber"), Some(&SearchOption::Single("3".into())));
        assert_eq!(request.get("resultsPerPage"), Some(&SearchOption::Single("20".into())));
        assert_eq!(request.get("query"), Some(&SearchOption::Multiple(vec!["rust".into()])));
        assert_eq!(
            request.get("filters"),
            Some(&SearchOption::Multiple(vec!["SourceType:Journals".into()]))
        );
        assert_eq!(request.get("sort"), Some(&SearchOption::Single("date".into())));
    }

    #[tokio::test]
    async fn test_zero_limit_is_first_page() {
        let f = warm_fixture();
        f.backend
            .search(&Query::keywords("rust"), 40, 0, None)
            .await
            .unwrap();
        let request = &f.transport.search_requests()[0].request;
        assert_eq!(request.get("pageNumber"), Some(&SearchOption::Single("1".into())));
    }

    #[tokio::test]
    async fn test_search_retries_once_after_auth_expiry() {
        let f = warm_fixture();
        f.transport.script_search(&[104]);

        let collection = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(f.transport.search_calls(), 2);
        assert_eq!(f.transport.authenticate_calls(), 1);
        assert_eq!(f.transport.create_session_calls(), 0);

        let calls = f.transport.search_requests();
        assert_eq!(calls[1].auth_token.as_deref(), Some("auth-1"));
        assert_eq!(calls[1].session_token, "cached-session");
    }

    #[tokio::test]
    async fn test_search_gives_up_after_second_auth_failure() {
        let f = warm_fixture();
        f.transport.script_search(&[104, 104]);

        let err = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Remote {
                kind: RemoteErrorKind::Api,
                code: 104,
                ..
            }
        ));
        assert_eq!(f.transport.search_calls(), 2);
        assert_eq!(f.transport.authenticate_calls(), 1);
    }

    #[tokio::test]
    async fn test_search_refreshes_session_on_108_and_109() {
        for code in [108, 109] {
            let f = warm_fixture();
            f.transport.script_search(&[code]);

            f.backend
                .search(&Query::keywords("rust"), 0, 20, None)
                .await
                .unwrap();
            assert_eq!(f.transport.search_calls(), 2);
            assert_eq!(f.transport.create_session_calls(), 1);
            assert_eq!(f.transport.info_calls(), 1);
            assert_eq!(f.transport.authenticate_calls(), 0);

            let calls = f.transport.search_requests();
            assert_eq!(calls[1].auth_token.as_deref(), Some("cached-auth"));
            assert_eq!(calls[1].session_token, "session-1");
            assert_eq!(f.session.get(SESSION_ID_KEY).unwrap().as_deref(), Some("session-1"));
        }
    }

    #[tokio::test]
    async fn test_never_refreshes_both_axes() {
        let f = warm_fixture();
        // Session refreshed for the first failure; the retry's 104 is final
        f.transport.script_search(&[109, 104]);

        let err = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(104));
        assert_eq!(f.transport.search_calls(), 2);
        assert_eq!(f.transport.authenticate_calls(), 0);
    }

    #[tokio::test]
    async fn test_other_codes_are_not_retried() {
        let f = warm_fixture();
        f.transport.script_search(&[106]);

        let err = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(106));
        assert_eq!(f.transport.search_calls(), 1);
        assert_eq!(f.transport.authenticate_calls(), 0);
        assert_eq!(f.transport.create_session_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_propagated() {
        let f = warm_fixture();
        f.transport.script_search(&[104]);
        f.transport.fail_authenticate(1102);

        let err = f
            .backend
            .search(&Query::keywords("rust"), 0, 20, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Remote {
                kind: RemoteErrorKind::Authentication,
                code: 1102,
                ..
            }
        ));
        assert_eq!(f.transport.search_calls(), 1);
        // The rejected token was dropped from the shared cache
        assert_eq!(f.cache.get(AUTH_TOKEN_CACHE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cold_start_creates_token_then_session() {
        let transport = Arc::new(ScriptedTransport::new());
        let backend = EdsBackend::new(
            transport.clone(),
            AccountIdentity::with_credentials("lib", "secret", "edsapi"),
            Arc::new(MemoryCache::new()),
            Arc::new(MemorySessionStore::new()),
        );

        backend
            .search(&Query::keywords("rust"), 0, 10, None)
            .await
            .unwrap();
        assert_eq!(transport.authenticate_calls(), 1);
        assert_eq!(transport.create_session_calls(), 1);
        assert_eq!(transport.info_calls(), 1);
        assert_eq!(transport.search_calls(), 1);
        assert!(backend.search_criteria().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ip_auth_search_sends_no_auth_token() {
        let transport = Arc::new(ScriptedTransport::new());
        let backend = EdsBackend::new(
            transport.clone(),
            AccountIdentity::ip_authenticated("edsapi"),
            Arc::new(MemoryCache::new()),
            Arc::new(MemorySessionStore::new()),
        );

        backend
            .search(&Query::keywords("rust"), 0, 10, None)
            .await
            .unwrap();
        assert_eq!(transport.authenticate_calls(), 0);
        assert_eq!(transport.search_requests()[0].auth_token, None);
    }

    #[tokio::test]
    async fn test_retrieve_splits_identifier() {
        let f = warm_fixture();
        let mut params = ParamBag::new();
        params.add(HIGHLIGHT_PARAM, "token");
        params.add(HIGHLIGHT_PARAM, "lifecycle");

        let collection = f.backend.retrieve("123,ABC456", Some(&params)).await.unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.first().unwrap().unique_id(), "123,ABC456");
        assert_eq!(collection.source_identifier, SOURCE_IDENTIFIER);

        let call = &f.transport.retrieve_requests()[0];
        assert_eq!(call.db_id, "123");
        assert_eq!(call.an, "ABC456");
        assert_eq!(call.highlight_terms, "token lifecycle");
    }

    #[tokio::test]
    async fn test_retrieve_malformed_id_makes_no_remote_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let backend = EdsBackend::new(
            transport.clone(),
            AccountIdentity::with_credentials("lib", "secret", "edsapi"),
            Arc::new(MemoryCache::new()),
            Arc::new(MemorySessionStore::new()),
        );

        let err = backend.retrieve("malformed", None).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidIdentifier(ref id) if id == "malformed"));
        assert_eq!(transport.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_retries_on_session_expiry() {
        let f = warm_fixture();
        f.transport.script_retrieve(&[109]);

        f.backend.retrieve("a9h,1", None).await.unwrap();
        let calls = f.transport.retrieve_requests();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].session_token, "session-1");
    }

    #[tokio::test]
    async fn test_retrieve_propagates_unhandled_codes() {
        let f = warm_fixture();
        f.transport.script_retrieve(&[132]);
        let err = f.backend.retrieve("a9h,1", None).await.unwrap_err();
        assert_eq!(err.code(), Some(132));
        assert_eq!(f.transport.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_profile_override() {
        let f = warm_fixture();
        let mut params = ParamBag::new();
        params.set(PROFILE_PARAM, "other");

        f.backend.retrieve("a9h,1", Some(&params)).await.unwrap();
        assert_eq!(f.transport.last_create_session_profile().as_deref(), Some("other"));
        assert_eq!(f.transport.retrieve_requests()[0].session_token, "session-1");
    }

    #[tokio::test]
    async fn test_get_info_with_explicit_session() {
        let f = warm_fixture();
        let info = f.backend.get_info(Some("given-session")).await.unwrap();
        assert_eq!(info.sorts(), vec!["relevance", "date"]);
        assert_eq!(
            f.transport.info_requests(),
            vec![(Some("cached-auth".to_string()), "given-session".to_string())]
        );
    }

    #[tokio::test]
    async fn test_get_info_propagates_unhandled_codes() {
        let f = warm_fixture();
        f.transport.script_info(&[135]);
        let err = f.backend.get_info(None).await.unwrap_err();
        assert_eq!(err.code(), Some(135));
        assert_eq!(f.transport.info_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_info_refreshes_auth_token_on_104() {
        let f = warm_fixture();
        f.transport.script_info(&[104]);

        f.backend.get_info(None).await.unwrap();
        assert_eq!(f.transport.authenticate_calls(), 1);
        assert_eq!(f.transport.create_session_calls(), 0);
        assert_eq!(
            f.transport.info_requests(),
            vec![
                (Some("cached-auth".to_string()), "cached-session".to_string()),
                (Some("auth-1".to_string()), "cached-session".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_info_refreshes_session_on_109() {
        let f = warm_fixture();
        f.transport.script_info(&[109]);

        f.backend.get_info(None).await.unwrap();
        assert_eq!(f.transport.authenticate_calls(), 0);
        assert_eq!(f.transport.create_session_calls(), 1);
        // Failed call, eager Info of the new session, then the retry
        let sessions: Vec<String> = f
            .transport
            .info_requests()
            .into_iter()
            .map(|(_, session)| session)
            .collect();
        assert_eq!(sessions, vec!["cached-session", "session-1", "session-1"]);
        assert_eq!(f.session.get(SESSION_ID_KEY).unwrap().as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_with_session_isolates_callers() {
        let f = warm_fixture();
        let other_session = Arc::new(MemorySessionStore::new());
        let other = f.backend.with_session(other_session.clone());

        other
            .search(&Query::keywords("rust"), 0, 10, None)
            .await
            .unwrap();
        // The shared token was reused; only the new caller got a new session
        assert_eq!(f.transport.authenticate_calls(), 0);
        assert_eq!(f.transport.create_session_calls(), 1);
        assert_eq!(other_session.get(SESSION_ID_KEY).unwrap().as_deref(), Some("session-1"));
        assert_eq!(
            f.session.get(SESSION_ID_KEY).unwrap().as_deref(),
            Some("cached-session")
        );
    }
}
