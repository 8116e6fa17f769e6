use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The Info response: search fields, sorts and limiters the session's
/// profile offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfoPayload {
    pub raw: Value,
}

impl InfoPayload {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    fn ids(&self, list: &str, id_field: &str) -> Vec<String> {
        self.raw
            .get("AvailableSearchCriteria")
            .and_then(|c| c.get(list))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(id_field).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn search_fields(&self) -> Vec<String> {
        self.ids("AvailableSearchFields", "FieldCode")
    }

    pub fn sorts(&self) -> Vec<String> {
        self.ids("AvailableSorts", "Id")
    }

    pub fn limiters(&self) -> Vec<String> {
        self.ids("AvailableLimiters", "Id")
    }
}
