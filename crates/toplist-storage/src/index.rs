//! Compound secondary indexes.
//!
//! An index is an ordered list of (dotted) field paths. Each indexed
//! document contributes one key-only entry whose components are the
//! order-preserving encodings of its field values, so a prefix scan over the
//! leading fields yields documents sorted by the trailing ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use toplist_types::field_path_dotted;

/// Definition of a compound index, e.g. `{tagname: 1, count: 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<String>,
}

impl IndexSpec {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
        }
    }

    /// Conventional name: `tagname_1_count_1`.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}_1", f))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Encoded component values of `doc` for this index.
    pub fn encode_document(&self, doc: &Value) -> Vec<Vec<u8>> {
        self.fields
            .iter()
            .map(|field| encode_value(field_path_dotted(doc, field)))
            .collect()
    }
}

/// Build progress of a registered index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Registered; existing documents are still being indexed
    Building,
    /// Every document is indexed
    Ready,
}

/// Stored record of a registered index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub spec: IndexSpec,
    pub state: IndexState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IndexMeta {
    pub fn building(spec: IndexSpec) -> Self {
        Self {
            spec,
            state: IndexState::Building,
            created_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

const TAG_NULL: u8 = b'0';
const TAG_BOOL: u8 = b'1';
const TAG_NUMBER: u8 = b'2';
const TAG_STRING: u8 = b'3';
const TAG_OTHER: u8 = b'4';

/// Encode one field value so that byte order matches value order within a
/// type (null < bool < number < string < other) and no `\0` byte appears.
pub fn encode_value(value: Option<&Value>) -> Vec<u8> {
    match value {
        None | Some(Value::Null) => vec![TAG_NULL],
        Some(Value::Bool(b)) => vec![TAG_BOOL, if *b { b'1' } else { b'0' }],
        Some(Value::Number(n)) => {
            let mut out = vec![TAG_NUMBER];
            let f = n.as_f64().unwrap_or(0.0);
            out.extend_from_slice(format!("{:016x}", ordered_bits(f)).as_bytes());
            out
        }
        Some(Value::String(s)) => {
            let mut out = vec![TAG_STRING];
            escape_into(s.as_bytes(), &mut out);
            out
        }
        Some(other) => {
            let mut out = vec![TAG_OTHER];
            escape_into(other.to_string().as_bytes(), &mut out);
            out
        }
    }
}

/// Map an f64 onto a u64 whose unsigned order matches numeric order.
fn ordered_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

// 0x00 -> 0x01 0x01, 0x01 -> 0x01 0x02
fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        match b {
            0 => out.extend_from_slice(&[1, 1]),
            1 => out.extend_from_slice(&[1, 2]),
            _ => out.push(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_name() {
        assert_eq!(
            IndexSpec::new(&["tagname", "count"]).name(),
            "tagname_1_count_1"
        );
    }

    #[test]
    fn test_number_encoding_preserves_order() {
        let values = [-1e9, -2.5, -1.0, 0.0, 1.0, 2.0, 10.0, 5000.0, 1e12];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode_value(Some(&json!(v))))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_integer_and_float_encode_equal() {
        assert_eq!(encode_value(Some(&json!(5))), encode_value(Some(&json!(5.0))));
    }

    #[test]
    fn test_string_encoding_has_no_nul() {
        let encoded = encode_value(Some(&json!("a\u{0}b\u{1}c")));
        assert!(!encoded.contains(&0));
        assert_eq!(encoded, vec![b'3', b'a', 1, 1, b'b', 1, 2, b'c']);
    }

    #[test]
    fn test_missing_and_null_encode_alike() {
        assert_eq!(encode_value(None), encode_value(Some(&Value::Null)));
    }

    #[test]
    fn test_encode_document_uses_dotted_paths() {
        let spec = IndexSpec::new(&["meta.tag", "count"]);
        let doc = json!({"meta": {"tag": "x"}, "count": 3});
        let parts = spec.encode_document(&doc);
        assert_eq!(parts[0], encode_value(Some(&json!("x"))));
        assert_eq!(parts[1], encode_value(Some(&json!(3))));
    }

    #[test]
    fn test_meta_roundtrip() {
        let meta = IndexMeta::building(IndexSpec::new(&["tagname", "count"]));
        let decoded = IndexMeta::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.spec, meta.spec);
        assert_eq!(decoded.state, IndexState::Building);
    }
}
