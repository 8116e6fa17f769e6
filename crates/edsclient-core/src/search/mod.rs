//! Search operations against EDS.
//!
//! This module provides the `EdsBackend` that callers search, retrieve and
//! fetch Info through, together with the parameter handling that turns a
//! `Query` plus caller parameters into an EDS search request.

pub mod backend;
pub mod params;
pub mod query;

pub use backend::{parse_record_id, EdsBackend, HIGHLIGHT_PARAM, PROFILE_PARAM, SOURCE_IDENTIFIER};
pub use params::{page_number, ParamBag, SearchOption, SearchRequestModel, MULTI_VALUED_PARAMS};
pub use query::{BooleanOperator, EdsQueryBuilder, Query, QueryBuilder, QueryClause};
