use std::fmt;

use super::params::ParamBag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
    Not,
}

impl fmt::Display for BooleanOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
            BooleanOperator::Not => "NOT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryClause {
    pub operator: Option<BooleanOperator>,
    /// EDS field code such as `TI` or `AU`; `None` searches all fields.
    pub field: Option<String>,
    pub term: String,
}

/// A search query as a list of clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub clauses: Vec<QueryClause>,
}

impl Query {
    /// A single all-fields keyword query.
    pub fn keywords(term: impl Into<String>) -> Self {
        Self {
            clauses: vec![QueryClause {
                operator: None,
                field: None,
                term: term.into(),
            }],
        }
    }

    pub fn with_clause(
        mut self,
        operator: BooleanOperator,
        field: Option<&str>,
        term: impl Into<String>,
    ) -> Self {
        self.clauses.push(QueryClause {
            operator: Some(operator),
            field: field.map(str::to_string),
            term: term.into(),
        });
        self
    }

    pub fn all_terms(&self) -> String {
        self.clauses
            .iter()
            .map(|c| c.term.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Turns a [`Query`] into the base parameters of a search request.
pub trait QueryBuilder: Send + Sync {
    fn build(&self, query: &Query) -> ParamBag;
}

/// Emits one `query` parameter per clause, in the EDS
/// `<OPERATOR>,<FIELD>:<term>` form.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdsQueryBuilder;

impl QueryBuilder for EdsQueryBuilder {
    fn build(&self, query: &Query) -> ParamBag {
        let mut params = ParamBag::new();
        for clause in &query.clauses {
            let term = clause.term.trim();
            if term.is_empty() {
                continue;
            }
            let field_term = match clause.field.as_deref() {
                Some(field) if !field.is_empty() => format!("{}:{}", field, term),
                _ => term.to_string(),
            };
            let value = match clause.operator {
                Some(op) => format!("{},{}", op, field_term),
                None => field_term,
            };
            params.add("query", value);
        }
        params
    }
}
