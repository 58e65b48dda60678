//! Source documents and optional field navigation.
//!
//! Source documents are schemaless JSON owned by the upstream store. Nested
//! fields are reached through [`field_path`], which treats a missing link
//! anywhere on the path as a plain `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToplistError;

/// A document read from the source store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable identifier, taken from the document's `_id`
    pub id: String,
    /// Full (or projected) document body
    pub body: Value,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Build a document from a JSON object carrying an `_id`.
    ///
    /// String ids are used verbatim and integer ids are rendered in decimal.
    pub fn from_value(body: Value) -> Result<Self, ToplistError> {
        let id = document_id(&body)
            .ok_or_else(|| ToplistError::InvalidInput("document has no usable _id".to_string()))?;
        Ok(Self { id, body })
    }

    /// Navigate into the body. See [`field_path`].
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        field_path(&self.body, path)
    }
}

/// Extract the `_id` of a JSON document as a string.
pub fn document_id(value: &Value) -> Option<String> {
    match value.get("_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Follow `path` through nested objects.
///
/// Returns `None` as soon as a link is absent or the current value is not an
/// object, so callers never have to special-case partial documents.
pub fn field_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Same as [`field_path`] for a dotted path such as `"book_stats.all.top_tags"`.
pub fn field_path_dotted<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let parts: Vec<&str> = path.split('.').collect();
    field_path(value, &parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_present() {
        let doc = json!({"book_stats": {"all": {"top_tags": [1, 2]}}});
        let tags = field_path(&doc, &["book_stats", "all", "top_tags"]).unwrap();
        assert_eq!(tags, &json!([1, 2]));
    }

    #[test]
    fn test_field_path_missing_link() {
        let doc = json!({"book_stats": {"done": {}}});
        assert!(field_path(&doc, &["book_stats", "all", "top_tags"]).is_none());
        assert!(field_path(&doc, &["music_stats", "all"]).is_none());
    }

    #[test]
    fn test_field_path_through_non_object() {
        let doc = json!({"book_stats": 42});
        assert!(field_path(&doc, &["book_stats", "all"]).is_none());
    }

    #[test]
    fn test_field_path_dotted() {
        let doc = json!({"a": {"b": {"c": "x"}}});
        assert_eq!(field_path_dotted(&doc, "a.b.c"), Some(&json!("x")));
        assert_eq!(field_path_dotted(&doc, ""), Some(&doc));
        assert!(field_path_dotted(&doc, "a.x").is_none());
    }

    #[test]
    fn test_document_id_forms() {
        assert_eq!(document_id(&json!({"_id": "u1"})), Some("u1".to_string()));
        assert_eq!(document_id(&json!({"_id": 1042})), Some("1042".to_string()));
        assert_eq!(document_id(&json!({"_id": ""})), None);
        assert_eq!(document_id(&json!({"_id": 1.5})), None);
        assert_eq!(document_id(&json!({"name": "x"})), None);
    }

    #[test]
    fn test_from_value_requires_id() {
        let err = SourceDocument::from_value(json!({"tags": []})).unwrap_err();
        assert!(matches!(err, ToplistError::InvalidInput(_)));
    }
}
