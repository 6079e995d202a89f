pub mod keys;
pub mod path;

pub use keys::KeyMapping;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name des Identifikator-Felds in jedem Dokument
pub const ID_FIELD: &str = "id";

/// Generisches Dokument (Objekt/Array/Skalar Baum) aus dem Change-Stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Erstelle Dokument aus einem JSON Value (nur Objekte erlaubt)
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// `id` als String, unabhängig vom ursprünglichen JSON-Typ
    pub fn id(&self) -> Option<String> {
        self.fields.get(ID_FIELD).map(value_as_string)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Rendere Skalare ohne JSON-Quotes, alles andere als kompaktes JSON
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
