//! Search document representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an indexed entity in the system of record.
pub type Uid = u64;

/// A document ready to be sent to the search engine.
///
/// The pipeline only cares about the identity; the field map is produced by
/// the domain builders and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Identity of the document. Adds are upserts on this value.
    pub uid: Uid,
    /// Indexed fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    /// Create a document with no fields.
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            fields: Map::new(),
        }
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Engine-side document id.
    pub fn document_id(&self) -> String {
        self.uid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_field() {
        let doc = SearchDocument::new(42)
            .with_field("name", "Blue Shirt")
            .with_field("price", 19.5);

        assert_eq!(doc.document_id(), "42");
        assert_eq!(doc.fields["name"], "Blue Shirt");
        assert_eq!(doc.fields["price"], 19.5);
    }
}
