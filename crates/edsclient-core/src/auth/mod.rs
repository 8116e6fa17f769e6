//! Authentication module for managing EDS credentials and sessions.
//!
//! This module provides:
//! - `TokenManager`: obtains, caches and invalidates the authentication
//!   token and the session token
//! - `SessionStore`: per-caller storage for the session token, in memory or
//!   persisted to disk
//! - `CredentialStore`: account passwords in the OS keychain
//!
//! Authentication tokens are not handed out within 5 minutes of expiry.

pub mod credentials;
pub mod session;
pub mod tokens;

pub use credentials::CredentialStore;
pub use session::{
    FileSessionStore, MemorySessionStore, SessionData, SessionStore, INFO_KEY, PROFILE_ID_KEY,
    SESSION_ID_KEY,
};
pub use tokens::{AuthenticationToken, SessionToken, TokenManager, AUTH_TOKEN_CACHE_KEY};
