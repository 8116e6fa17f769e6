//! Process-wide credential caching.
//!
//! This module provides the `CredentialCache` trait the token manager keeps
//! the account authentication token in, with two backings:
//!
//! - `FileCache`: one JSON file per key, shared by every process using the
//!   same cache directory
//! - `MemoryCache`: a map living as long as the process

pub mod manager;

pub use manager::{CachedData, CredentialCache, FileCache, MemoryCache};
