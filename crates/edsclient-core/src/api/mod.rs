//! REST API client module for the EBSCO Discovery Service.
//!
//! This module provides the `EdsTransport` trait describing the remote
//! operations (Authenticate, CreateSession, Search, Retrieve, Info) and the
//! `EdsApiClient` that implements it over HTTP.
//!
//! Requests carry the authentication token and the session token in the
//! `x-authenticationToken` and `x-sessionToken` headers.

pub mod client;
pub mod error;

pub use client::{AuthResponse, EdsApiClient, EdsTransport};
pub use error::{
    ApiError, Credential, Operation, AUTH_TOKEN_INVALID, SESSION_TOKEN_INVALID,
    SESSION_TOKEN_MISSING,
};
