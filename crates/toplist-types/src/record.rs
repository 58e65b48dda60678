//! Output records produced by the rollup.

use serde::{Deserialize, Serialize};

/// One flattened `(entity, tag, count)` row in a rollup collection.
///
/// The id is `<source_id>::<rank_index>`, a pure function of the source
/// document and the tag's position in its list, so re-running a rollup
/// regenerates identical ids. Every position yields a record; an entry
/// without a label keeps its slot with a null `tagname`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub tagname: Option<String>,
    pub count: i64,
}

impl TagRecord {
    /// Build the record for the tag at `rank` in `source_id`'s tag list.
    pub fn at_rank(source_id: &str, rank: usize, tagname: impl Into<String>, count: i64) -> Self {
        Self {
            id: record_id(source_id, rank),
            tagname: Some(tagname.into()),
            count,
        }
    }

    /// Record for an entry at `rank` that carries no label.
    pub fn unlabelled(source_id: &str, rank: usize, count: i64) -> Self {
        Self {
            id: record_id(source_id, rank),
            tagname: None,
            count,
        }
    }
}

/// Composite record id: `<source_id>::<rank>`.
pub fn record_id(source_id: &str, rank: usize) -> String {
    format!("{}::{}", source_id, rank)
}
