use serde::Serialize;
use serde_json::Value;

use crate::api::error::lenient_i64;
use crate::error::BackendError;

/// One EDS result, identified by its database id and accession number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub db_id: String,
    pub an: String,
    pub raw: Value,
}

impl Record {
    pub fn from_raw(raw: Value) -> Self {
        let header = raw.get("Header");
        let field = |name: &str| {
            header
                .and_then(|h| h.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            db_id: field("DbId"),
            an: field("An"),
            raw,
        }
    }

    /// The `<dbId>,<an>` identifier accepted by retrieve.
    pub fn unique_id(&self) -> String {
        format!("{},{}", self.db_id, self.an)
    }

    pub fn title(&self) -> Option<&str> {
        self.raw
            .get("Items")?
            .as_array()?
            .iter()
            .find(|item| item.get("Name").and_then(Value::as_str) == Some("Title"))?
            .get("Data")?
            .as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordCollection {
    pub total: u64,
    pub offset: usize,
    pub records: Vec<Record>,
    pub facets: Vec<Value>,
    pub source_identifier: String,
}

impl RecordCollection {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Builds record collections from raw EDS payloads.
pub trait RecordCollectionFactory: Send + Sync {
    fn factory(&self, payload: Value) -> Result<RecordCollection, BackendError>;
}

/// Understands Search responses (`SearchResult`) and retrieved records
/// wrapped as `{"Records": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdsRecordCollectionFactory;

impl RecordCollectionFactory for EdsRecordCollectionFactory {
    fn factory(&self, payload: Value) -> Result<RecordCollection, BackendError> {
        if let Some(result) = payload.get("SearchResult") {
            let records: Vec<Record> = result
                .pointer("/Data/Records")
                .and_then(Value::as_array)
                .map(|records| records.iter().cloned().map(Record::from_raw).collect())
                .unwrap_or_default();
            let total = lenient_i64(result.pointer("/Statistics/TotalHits"))
                .and_then(|t| u64::try_from(t).ok())
                .unwrap_or(records.len() as u64);
            let facets = result
                .get("AvailableFacets")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return Ok(RecordCollection {
                total,
                records,
                facets,
                ..RecordCollection::default()
            });
        }

        if let Some(records) = payload.get("Records").and_then(Value::as_array) {
            let records: Vec<Record> = records.iter().cloned().map(Record::from_raw).collect();
            return Ok(RecordCollection {
                total: records.len() as u64,
                records,
                ..RecordCollection::default()
            });
        }

        Err(BackendError::InvalidResponse(
            "payload has neither SearchResult nor Records".to_string(),
        ))
    }
}
