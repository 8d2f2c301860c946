use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::KVError;

/// Field-equality predicate over JSON documents, in the shape of a CouchDB
/// `{"selector": {...}}` rich query.
///
/// Field names are matched exactly (case-sensitive) against the top-level
/// keys of the stored document. A document matches when every field is
/// present and equal to the expected value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    fields: BTreeMap<String, Value>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality constraint. A later constraint on the same field wins.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Test a document. Anything other than a JSON object never matches.
    pub fn matches(&self, doc: &Value) -> bool {
        let Some(obj) = doc.as_object() else {
            return false;
        };
        self.fields
            .iter()
            .all(|(field, expected)| obj.get(field) == Some(expected))
    }

    /// Decode raw bytes and test them. Bytes that are not JSON never match.
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        serde_json::from_slice::<Value>(bytes)
            .map(|doc| self.matches(&doc))
            .unwrap_or(false)
    }

    /// Render as a rich query string, e.g. `{"selector":{"docType":"b"}}`.
    pub fn to_query_string(&self) -> String {
        let selector: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::json!({ "selector": selector }).to_string()
    }

    /// Parse a rich query string. Only flat equality selectors are accepted.
    pub fn parse(query: &str) -> Result<Self, KVError> {
        let doc: Value = serde_json::from_str(query)
            .map_err(|e| KVError::InvalidSelector(e.to_string()))?;
        let obj = doc
            .get("selector")
            .and_then(Value::as_object)
            .ok_or_else(|| KVError::InvalidSelector("missing \"selector\" object".into()))?;

        let mut selector = Selector::new();
        for (field, value) in obj {
            if value.is_object() || value.is_array() {
                return Err(KVError::InvalidSelector(format!(
                    "field {field}: only equality on scalar values is supported"
                )));
            }
            selector = selector.eq(field.clone(), value.clone());
        }
        Ok(selector)
    }
}
