//! Data models for EDS results.
//!
//! - `Record`, `RecordCollection`: search and retrieve results
//! - `RecordCollectionFactory`: turns raw payloads into collections
//! - `InfoPayload`: the search criteria of a session's profile

pub mod info;
pub mod record;

pub use info::InfoPayload;
pub use record::{EdsRecordCollectionFactory, Record, RecordCollection, RecordCollectionFactory};
