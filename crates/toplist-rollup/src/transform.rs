//! Fan-out transform: one source document to its tag records.

use serde_json::Value;
use tracing::debug;

use toplist_types::{field_path, SourceDocument, TagRecord};

/// Where a document keeps its tag list, and how entries are labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSource {
    /// `doc[<ns>_stats][status].top_tags`, entries labelled by `_id`
    UserTopTags { stats_field: String, status: String },
    /// `doc.tags`, entries labelled by `name`
    SubjectTags,
}

impl TagSource {
    pub fn user_top_tags(namespace: &str, status: &str) -> Self {
        TagSource::UserTopTags {
            stats_field: format!("{}_stats", namespace),
            status: status.to_string(),
        }
    }

    /// The tag list of `doc`, if every link on the way is present.
    pub fn tag_list<'a>(&self, doc: &'a SourceDocument) -> Option<&'a Vec<Value>> {
        let list = match self {
            TagSource::UserTopTags {
                stats_field,
                status,
            } => field_path(&doc.body, &[stats_field.as_str(), status.as_str(), "top_tags"]),
            TagSource::SubjectTags => doc.get(&["tags"]),
        };
        list?.as_array()
    }

    /// Dotted path of the tag list, used to project source documents.
    pub fn projection_path(&self) -> String {
        match self {
            TagSource::UserTopTags {
                stats_field,
                status,
            } => format!("{}.{}.top_tags", stats_field, status),
            TagSource::SubjectTags => "tags".to_string(),
        }
    }

    fn label_field(&self) -> &'static str {
        match self {
            TagSource::UserTopTags { .. } => "_id",
            TagSource::SubjectTags => "name",
        }
    }
}

/// Derive the tag records of one document.
///
/// A document without the tag list yields nothing. Entry `i` of the list
/// always becomes record `<id>::i`; an entry without a string label gets a
/// null `tagname` so its slot is still replaced on every run.
pub fn fan_out(doc: &SourceDocument, source: &TagSource) -> Vec<TagRecord> {
    let Some(entries) = source.tag_list(doc) else {
        return Vec::new();
    };
    let label_field = source.label_field();

    entries
        .iter()
        .enumerate()
        .map(|(rank, entry)| {
            let count = count_of(entry.get("count"));
            match entry.get(label_field).and_then(Value::as_str) {
                Some(label) => TagRecord::at_rank(&doc.id, rank, label, count),
                None => {
                    debug!(id = %doc.id, rank, "Tag entry without a label");
                    TagRecord::unlabelled(&doc.id, rank, count)
                }
            }
        })
        .collect()
}

/// Integer count of a tag entry. Missing or non-numeric counts are 0.
fn count_of(value: Option<&Value>) -> i64 {
    let Some(Value::Number(n)) = value else {
        return 0;
    };
    if let Some(i) = n.as_i64() {
        i
    } else if n.is_u64() {
        i64::MAX
    } else {
        // `as` saturates and maps NaN to 0
        n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(body: Value) -> SourceDocument {
        SourceDocument::from_value(body).unwrap()
    }

    #[test]
    fn test_user_top_tags_in_order() {
        let doc = user(json!({
            "_id": "u1",
            "book_stats": {"all": {"top_tags": [
                {"_id": "scifi", "count": 5},
                {"_id": "drama", "count": 2}
            ]}}
        }));
        let records = fan_out(&doc, &TagSource::user_top_tags("book", "all"));
        assert_eq!(
            records,
            vec![
                TagRecord::at_rank("u1", 0, "scifi", 5),
                TagRecord::at_rank("u1", 1, "drama", 2),
            ]
        );
    }

    #[test]
    fn test_k_tags_give_k_contiguous_ids() {
        let tags: Vec<Value> = (0..25)
            .map(|i| json!({"_id": format!("t{}", i), "count": i}))
            .collect();
        let doc = user(json!({"_id": "u9", "music_stats": {"done": {"top_tags": tags}}}));
        let records = fan_out(&doc, &TagSource::user_top_tags("music", "done"));

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("u9::{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_missing_links_produce_nothing() {
        let source = TagSource::user_top_tags("book", "all");
        for body in [
            json!({"_id": "a"}),
            json!({"_id": "a", "book_stats": {}}),
            json!({"_id": "a", "book_stats": {"all": {}}}),
            json!({"_id": "a", "book_stats": {"all": {"top_tags": []}}}),
            json!({"_id": "a", "book_stats": {"all": {"top_tags": "oops"}}}),
            json!({"_id": "a", "book_stats": null}),
        ] {
            assert!(fan_out(&user(body), &source).is_empty());
        }
    }

    #[test]
    fn test_subject_tags_use_name_not_title() {
        let doc = user(json!({
            "_id": "s1",
            "tags": [{"name": "fiction", "title": "Fiction!", "count": 30}]
        }));
        let records = fan_out(&doc, &TagSource::SubjectTags);
        assert_eq!(records, vec![TagRecord::at_rank("s1", 0, "fiction", 30)]);
    }

    #[test]
    fn test_integer_subject_id() {
        let doc = user(json!({"_id": 1042, "tags": [{"name": "poetry", "count": 3}]}));
        let records = fan_out(&doc, &TagSource::SubjectTags);
        assert_eq!(records[0].id, "1042::0");
    }

    #[test]
    fn test_unlabelled_entry_keeps_its_slot() {
        let doc = user(json!({
            "_id": "s2",
            "tags": [
                {"name": "a", "count": 1},
                {"title": "no name", "count": 9},
                {"name": "c", "count": 3}
            ]
        }));
        let records = fan_out(&doc, &TagSource::SubjectTags);
        assert_eq!(
            records,
            vec![
                TagRecord::at_rank("s2", 0, "a", 1),
                TagRecord::unlabelled("s2", 1, 9),
                TagRecord::at_rank("s2", 2, "c", 3),
            ]
        );
    }

    #[test]
    fn test_count_coercion() {
        assert_eq!(count_of(Some(&json!(7))), 7);
        assert_eq!(count_of(Some(&json!(7.9))), 7);
        assert_eq!(count_of(Some(&json!("7"))), 0);
        assert_eq!(count_of(None), 0);
        assert_eq!(count_of(Some(&json!(u64::MAX))), i64::MAX);
    }

    #[test]
    fn test_projection_paths() {
        assert_eq!(
            TagSource::user_top_tags("movie", "wish").projection_path(),
            "movie_stats.wish.top_tags"
        );
        assert_eq!(TagSource::SubjectTags.projection_path(), "tags");
    }
}
