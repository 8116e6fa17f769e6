//! Scripted [`EdsTransport`] for unit tests.
//!
//! Each operation pops the next scripted error code, if any, and otherwise
//! succeeds. Every call is recorded so tests can assert exact call counts.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{ApiError, AuthResponse, EdsTransport, Operation};
use crate::search::SearchRequestModel;

#[derive(Debug, Clone)]
pub(crate) struct SearchCall {
    pub auth_token: Option<String>,
    pub session_token: String,
    pub request: SearchRequestModel,
}

#[derive(Debug, Clone)]
pub(crate) struct RetrieveCall {
    pub an: String,
    pub db_id: String,
    pub highlight_terms: String,
    pub auth_token: Option<String>,
    pub session_token: String,
}

#[derive(Default)]
struct State {
    authenticate: Vec<(String, String, Option<String>)>,
    authenticate_failure: Option<i64>,
    create_session: Vec<String>,
    create_session_script: VecDeque<i64>,
    info: Vec<(Option<String>, String)>,
    info_script: VecDeque<i64>,
    search: Vec<SearchCall>,
    search_script: VecDeque<i64>,
    retrieve: Vec<RetrieveCall>,
    retrieve_script: VecDeque<i64>,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    state: Mutex<State>,
}

pub(crate) fn info_payload() -> Value {
    json!({
        "AvailableSearchCriteria": {
            "AvailableSearchFields": [
                {"FieldCode": "TI", "Label": "Title"},
                {"FieldCode": "AU", "Label": "Author"}
            ],
            "AvailableSorts": [{"Id": "relevance"}, {"Id": "date"}],
            "AvailableLimiters": [{"Id": "FT", "Type": "select"}]
        }
    })
}

pub(crate) fn search_payload() -> Value {
    json!({
        "SearchResult": {
            "Statistics": {"TotalHits": 2},
            "Data": {
                "Records": [
                    {"Header": {"DbId": "a9h", "An": "1001"}},
                    {"Header": {"DbId": "edb", "An": "2002"}}
                ]
            }
        }
    })
}

fn scripted(script: &mut VecDeque<i64>, operation: Operation) -> Result<(), ApiError> {
    match script.pop_front() {
        Some(code) => Err(ApiError::remote(operation, code, format!("scripted {}", code))),
        None => Ok(()),
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_authenticate(&self, code: i64) {
        self.state().authenticate_failure = Some(code);
    }

    pub fn script_create_session(&self, codes: &[i64]) {
        self.state().create_session_script.extend(codes);
    }

    pub fn script_info(&self, codes: &[i64]) {
        self.state().info_script.extend(codes);
    }

    pub fn script_search(&self, codes: &[i64]) {
        self.state().search_script.extend(codes);
    }

    pub fn script_retrieve(&self, codes: &[i64]) {
        self.state().retrieve_script.extend(codes);
    }

    pub fn authenticate_calls(&self) -> usize {
        self.state().authenticate.len()
    }

    pub fn last_authenticate(&self) -> Option<(String, String, Option<String>)> {
        self.state().authenticate.last().cloned()
    }

    pub fn create_session_calls(&self) -> usize {
        self.state().create_session.len()
    }

    pub fn last_create_session_profile(&self) -> Option<String> {
        self.state().create_session.last().cloned()
    }

    pub fn info_calls(&self) -> usize {
        self.state().info.len()
    }

    pub fn info_requests(&self) -> Vec<(Option<String>, String)> {
        self.state().info.clone()
    }

    pub fn search_calls(&self) -> usize {
        self.state().search.len()
    }

    pub fn search_requests(&self) -> Vec<SearchCall> {
        self.state().search.clone()
    }

    pub fn retrieve_calls(&self) -> usize {
        self.state().retrieve.len()
    }

    pub fn retrieve_requests(&self) -> Vec<RetrieveCall> {
        self.state().retrieve.clone()
    }

    pub fn remote_calls(&self) -> usize {
        let state = self.state();
        state.authenticate.len()
            + state.create_session.len()
            + state.info.len()
            + state.search.len()
            + state.retrieve.len()
    }
}

#[async_trait]
impl EdsTransport for ScriptedTransport {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        org_id: Option<&str>,
    ) -> Result<AuthResponse, ApiError> {
        let mut state = self.state();
        state.authenticate.push((
            username.to_string(),
            password.to_string(),
            org_id.map(str::to_string),
        ));
        if let Some(code) = state.authenticate_failure {
            return Err(ApiError::remote(Operation::Authenticate, code, "rejected"));
        }
        Ok(AuthResponse {
            token: format!("auth-{}", state.authenticate.len()),
            timeout_secs: 1800,
        })
    }

    async fn create_session(
        &self,
        profile: &str,
        _guest: bool,
        _auth_token: Option<&str>,
    ) -> Result<String, ApiError> {
        let mut state = self.state();
        state.create_session.push(profile.to_string());
        scripted(&mut state.create_session_script, Operation::CreateSession)?;
        Ok(format!("session-{}", state.create_session.len()))
    }

    async fn search(
        &self,
        request: &SearchRequestModel,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError> {
        let mut state = self.state();
        state.search.push(SearchCall {
            auth_token: auth_token.map(str::to_string),
            session_token: session_token.to_string(),
            request: request.clone(),
        });
        scripted(&mut state.search_script, Operation::Search)?;
        Ok(search_payload())
    }

    async fn retrieve(
        &self,
        an: &str,
        db_id: &str,
        highlight_terms: &str,
        auth_token: Option<&str>,
        session_token: &str,
    ) -> Result<Value, ApiError> {
        let mut state = self.state();
        state.retrieve.push(RetrieveCall {
            an: an.to_string(),
            db_id: db_id.to_string(),
            highlight_terms: highlight_terms.to_string(),
            auth_token: auth_token.map(str::to_string),
            session_token: session_token.to_string(),
        });
        scripted(&mut state.retrieve_script, Operation::Retrieve)?;
        Ok(json!({"Record": {"Header": {"DbId": db_id, "An": an}}}))
    }

    async fn info(&self, auth_token: Option<&str>, session_token: &str) -> Result<Value, ApiError> {
        let mut state = self.state();
        state
            .info
            .push((auth_token.map(str::to_string), session_token.to_string()));
        scripted(&mut state.info_script, Operation::Info)?;
        Ok(info_payload())
    }
}
