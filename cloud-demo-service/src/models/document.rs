use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document read back from the document store.
///
/// Serializes as a flat JSON object: every stored field plus `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DocumentRecord {
    /// A stored `id` field is shadowed by the document identifier.
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A document to insert. Fields listed in `server_timestamps` are filled in by
/// the store at commit time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.server_timestamps.push(name.into());
        self
    }
}
