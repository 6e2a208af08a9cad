//! Opaque vendor payload carried alongside normalized columns

use serde::{Deserialize, Serialize};

/// Vendor-native JSON for an entity
///
/// Normalized fields are extracted at the adapter boundary; everything else
/// the vendor sent is kept here untouched so callers can still reach fields
/// the domain model does not name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionPayload(serde_json::Value);

impl ExtensionPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Empty JSON object
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Looks up a top-level string field
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }
}

impl From<serde_json::Value> for ExtensionPayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
