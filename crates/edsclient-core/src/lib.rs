//! Client for the EBSCO Discovery Service (EDS) API.
//!
//! Searches and record retrievals go through [`EdsBackend`], which keeps the
//! account authentication token and the per-session token valid on the
//! caller's behalf: tokens are cached, refreshed ahead of expiry, and when
//! EDS reports one of them invalid the call is repeated once with a fresh
//! credential.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, EdsApiClient, EdsTransport};
pub use auth::{CredentialStore, FileSessionStore, MemorySessionStore, SessionStore, TokenManager};
pub use cache::{CredentialCache, FileCache, MemoryCache};
pub use config::{AccountIdentity, EdsConfig};
pub use error::{BackendError, RemoteErrorKind};
pub use models::{InfoPayload, Record, RecordCollection, RecordCollectionFactory};
pub use search::{EdsBackend, ParamBag, Query};
