//! Key encoding and decoding for storage layer.
//!
//! Key formats (`\0` is a literal zero byte):
//! - document: `{collection}\0{id}`
//! - index spec: `{collection}\0{index_name}`
//! - index entry: `{collection}\0{index_name}\0{v1}\0{v2}...\0{id}`
//! - job run: `run:{job_name}`
//!
//! Collection and index names may not contain `\0`. Index components are
//! escaped (see [`crate::index::encode_value`]) so they never do either,
//! which keeps every prefix scan exact.

use crate::error::StorageError;

const SEP: u8 = 0;

fn check_name(kind: &str, name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::Key(format!("{} name is empty", kind)));
    }
    if name.as_bytes().contains(&SEP) {
        return Err(StorageError::Key(format!(
            "{} name contains a NUL byte: {:?}",
            kind, name
        )));
    }
    Ok(())
}

/// Key for a document in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: &str, id: &str) -> Result<Self, StorageError> {
        check_name("collection", collection)?;
        if id.is_empty() || id.as_bytes().contains(&SEP) {
            return Err(StorageError::Key(format!("Invalid document id: {:?}", id)));
        }
        Ok(Self {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    /// Prefix shared by every document in `collection`.
    pub fn collection_prefix(collection: &str) -> Result<Vec<u8>, StorageError> {
        check_name("collection", collection)?;
        let mut prefix = collection.as_bytes().to_vec();
        prefix.push(SEP);
        Ok(prefix)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = self.collection.as_bytes().to_vec();
        key.push(SEP);
        key.extend_from_slice(self.id.as_bytes());
        key
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let pos = bytes
            .iter()
            .position(|b| *b == SEP)
            .ok_or_else(|| StorageError::Key("document key has no separator".to_string()))?;
        let collection = std::str::from_utf8(&bytes[..pos])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let id = std::str::from_utf8(&bytes[pos + 1..])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        Ok(Self {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}

/// Key for a registered index definition.
pub fn index_spec_key(collection: &str, index_name: &str) -> Result<Vec<u8>, StorageError> {
    check_name("index", index_name)?;
    let mut key = DocumentKey::collection_prefix(collection)?;
    key.extend_from_slice(index_name.as_bytes());
    Ok(key)
}

/// Key for one secondary index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntryKey {
    pub collection: String,
    pub index_name: String,
    /// Encoded field values, in index field order
    pub values: Vec<Vec<u8>>,
    pub id: String,
}

impl IndexEntryKey {
    /// Prefix for all entries of an index whose leading fields equal `values`.
    pub fn prefix(
        collection: &str,
        index_name: &str,
        values: &[Vec<u8>],
    ) -> Result<Vec<u8>, StorageError> {
        let mut key = index_spec_key(collection, index_name)?;
        key.push(SEP);
        for value in values {
            key.extend_from_slice(value);
            key.push(SEP);
        }
        Ok(key)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let mut key = Self::prefix(&self.collection, &self.index_name, &self.values)?;
        key.extend_from_slice(self.id.as_bytes());
        Ok(key)
    }

    /// Recover the document id (everything after the last separator).
    pub fn id_from_bytes(bytes: &[u8]) -> Result<String, StorageError> {
        let pos = bytes
            .iter()
            .rposition(|b| *b == SEP)
            .ok_or_else(|| StorageError::Key("index key has no separator".to_string()))?;
        std::str::from_utf8(&bytes[pos + 1..])
            .map(|s| s.to_string())
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
    }
}

/// Key for a job run record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunKey {
    pub job_name: String,
}

impl JobRunKey {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("run:{}", self.job_name).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let name = s
            .strip_prefix("run:")
            .ok_or_else(|| StorageError::Key(format!("Invalid job run key: {}", s)))?;
        Ok(Self::new(name))
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// `prefix` always ends with a separator byte here, so bumping that byte is
/// enough.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut bound = prefix.to_vec();
    if let Some(last) = bound.last_mut() {
        *last = last.saturating_add(1);
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_roundtrip() {
        let key = DocumentKey::new("top_book_by_tag", "s1::0").unwrap();
        let bytes = key.to_bytes();
        assert_eq!(bytes, b"top_book_by_tag\0s1::0".to_vec());
        assert_eq!(DocumentKey::from_bytes(&bytes).unwrap(), key);
    }

    #[test]
    fn test_document_keys_sort_within_collection() {
        let prefix = DocumentKey::collection_prefix("user").unwrap();
        let a = DocumentKey::new("user", "a").unwrap().to_bytes();
        let other = DocumentKey::new("users", "a").unwrap().to_bytes();
        assert!(a.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(DocumentKey::new("", "x").is_err());
        assert!(DocumentKey::new("a\0b", "x").is_err());
        assert!(DocumentKey::new("user", "").is_err());
        assert!(DocumentKey::new("user", "u\01").is_err());
    }

    #[test]
    fn test_index_entry_id_extraction() {
        let key = IndexEntryKey {
            collection: "top_book_by_tag".to_string(),
            index_name: "tagname_1_count_1".to_string(),
            values: vec![b"3fiction".to_vec(), b"2c03e000000000000".to_vec()],
            id: "s1::0".to_string(),
        };
        let bytes = key.to_bytes().unwrap();
        assert_eq!(IndexEntryKey::id_from_bytes(&bytes).unwrap(), "s1::0");
        let prefix =
            IndexEntryKey::prefix("top_book_by_tag", "tagname_1_count_1", &key.values[..1])
                .unwrap();
        assert!(bytes.starts_with(&prefix));
    }

    #[test]
    fn test_job_run_key_roundtrip() {
        let key = JobRunKey::new("users:book:all");
        assert_eq!(JobRunKey::from_bytes(&key.to_bytes()).unwrap(), key);
        assert!(JobRunKey::from_bytes(b"bogus").is_err());
    }

    #[test]
    fn test_prefix_upper_bound() {
        let bound = prefix_upper_bound(b"abc\0");
        assert_eq!(bound, b"abc\x01".to_vec());
        assert!(b"abc\0zzz".as_slice() < bound.as_slice());
    }
}
