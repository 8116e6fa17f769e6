//! Search parameters and their flattening into an EDS search request.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Parameters that stay lists when flattened; every other parameter
/// collapses to its first value.
pub const MULTI_VALUED_PARAMS: [&str; 6] = [
    "query",
    "facets",
    "filters",
    "groupFilters",
    "rangeFilters",
    "limiters",
];

/// An ordered collection of named, possibly repeated, parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamBag {
    params: Vec<(String, Vec<String>)>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|(n, _)| n == name)
    }

    /// Replace all values of `name` with `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.params[i].1 = vec![value],
            None => self.params.push((name, vec![value])),
        }
    }

    /// Append `value` to `name`, keeping existing values.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.params[i].1.push(value),
            None => self.params.push((name, vec![value])),
        }
    }

    pub fn get(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|i| self.params[i].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.params.remove(i).1)
    }

    /// Merge another bag into this one. Values for a name already present
    /// are appended after the existing ones.
    pub fn merge_with(&mut self, other: &ParamBag) {
        for (name, values) in &other.params {
            for value in values {
                self.add(name.clone(), value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// `name=value` pairs in order, one per value.
    pub fn request(&self) -> Vec<String> {
        self.params
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| format!("{}={}", name, v)))
            .collect()
    }
}

/// Page number for an offset/limit pair. A zero limit always yields page 1.
pub fn page_number(offset: usize, limit: usize) -> usize {
    if limit > 0 {
        offset / limit + 1
    } else {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOption {
    Single(String),
    Multiple(Vec<String>),
}

/// A flattened search request, ready to send to the Search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequestModel {
    options: Vec<(String, SearchOption)>,
}

impl SearchRequestModel {
    pub fn from_params(params: &ParamBag) -> Self {
        let options = params
            .iter()
            .filter_map(|(name, values)| {
                let option = if MULTI_VALUED_PARAMS.contains(&name) {
                    SearchOption::Multiple(values.to_vec())
                } else {
                    SearchOption::Single(values.first()?.clone())
                };
                Some((name.to_string(), option))
            })
            .collect();
        Self { options }
    }

    pub fn get(&self, name: &str) -> Option<&SearchOption> {
        self.options.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        for (name, option) in &self.options {
            match option {
                SearchOption::Single(value) => parts.push(format!("{}={}", name, value)),
                SearchOption::Multiple(values) => {
                    parts.extend(values.iter().map(|v| format!("{}={}", name, v)))
                }
            }
        }
        parts.join("&")
    }
}

impl Serialize for SearchRequestModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.options.len()))?;
        for (name, option) in &self.options {
            match option {
                SearchOption::Single(value) => map.serialize_entry(name, value)?,
                SearchOption::Multiple(values) => map.serialize_entry(name, values)?,
            }
        }
        map.end()
    }
}
