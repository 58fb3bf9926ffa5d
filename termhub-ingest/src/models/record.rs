//! Row and record types flowing through the pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use termhub_common::events::RowCounts;
use uuid::Uuid;

/// One raw record from the input file: an ordered mapping of column name
/// to raw cell value. Ephemeral; exists only during streaming and is never
/// persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 0-based data row index within the source (header excluded)
    pub offset: u64,
    /// Column name → raw cell value, in file column order
    pub columns: Vec<(String, String)>,
}

impl SourceRow {
    pub fn new(offset: u64, columns: Vec<(String, String)>) -> Self {
        Self { offset, columns }
    }

    /// Cell value by column name (first match)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value.as_str())
    }

    /// First cell value, conventionally the term name
    pub fn identity_cell(&self) -> Option<&str> {
        self.columns.first().map(|(_, value)| value.as_str())
    }
}

/// Parsed content of one section
///
/// A section is either prose, an ordered list, or a nested mapping of
/// subsection name to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionContent {
    Text(String),
    List(Vec<String>),
    Fields(BTreeMap<String, String>),
}

impl SectionContent {
    /// Whether this content carries no text at all
    pub fn is_empty(&self) -> bool {
        match self {
            SectionContent::Text(text) => text.is_empty(),
            SectionContent::List(items) => items.is_empty(),
            SectionContent::Fields(fields) => fields.is_empty(),
        }
    }
}

/// Provenance for one mapped record: which sections were AI-derived versus
/// degraded to rule-based output, and when
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentMeta {
    /// Columns whose content was produced by the enrichment service
    pub ai_fields: Vec<String>,
    /// Columns configured for enrichment that fell back to rules
    pub degraded_fields: Vec<String>,
    /// When enrichment ran (None if fully rule-derived)
    pub enriched_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Fully mapped output for one source row, ready for persistence
#[derive(Debug, Clone)]
pub struct EnrichedRecord {
    /// Identity key, unique across the store
    pub slug: String,
    /// Display name (the term)
    pub name: String,
    /// Fingerprint of the full source row, for change detection
    pub fingerprint: String,
    /// Section name → parsed content
    pub sections: BTreeMap<String, SectionContent>,
    /// Derived prose definition (length-capped)
    pub definition: Option<String>,
    /// Derived short definition (length-capped)
    pub short_definition: Option<String>,
    /// Derived category name
    pub category: Option<String>,
    /// Enrichment provenance
    pub meta: EnrichmentMeta,
    /// Source row offset this record came from
    pub source_offset: u64,
}

/// Durable progress marker for one job
///
/// Mutated only by the persistence layer, in the same transaction as the
/// batch it describes: the batch's records are visible if and only if the
/// checkpoint advance is visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointState {
    pub job_id: Uuid,
    /// Highest row offset covered by a committed batch; -1 before the
    /// first commit
    pub last_committed_offset: i64,
    /// Total rows expected, when the source knows it up front
    pub total_rows: Option<i64>,
    pub counts: RowCounts,
}

impl CheckpointState {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            last_committed_offset: -1,
            total_rows: None,
            counts: RowCounts::default(),
        }
    }

    /// Row offset to resume reading from
    pub fn resume_offset(&self) -> u64 {
        (self.last_committed_offset + 1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_row_lookup() {
        let row = SourceRow::new(
            0,
            vec![
                ("Term".to_string(), "Gradient Descent".to_string()),
                ("Introduction – Definition and Overview".to_string(), "An optimizer".to_string()),
            ],
        );
        assert_eq!(row.identity_cell(), Some("Gradient Descent"));
        assert_eq!(
            row.get("Introduction – Definition and Overview"),
            Some("An optimizer")
        );
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_section_content_empty() {
        assert!(SectionContent::Text(String::new()).is_empty());
        assert!(SectionContent::List(vec![]).is_empty());
        assert!(!SectionContent::Text("x".to_string()).is_empty());
    }

    #[test]
    fn test_checkpoint_resume_offset() {
        let mut checkpoint = CheckpointState::new(Uuid::new_v4());
        assert_eq!(checkpoint.resume_offset(), 0);
        checkpoint.last_committed_offset = 99;
        assert_eq!(checkpoint.resume_offset(), 100);
    }

    #[test]
    fn test_section_content_serialization() {
        let text = SectionContent::Text("prose".to_string());
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"prose\"");

        let list = SectionContent::List(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["a","b"]"#);

        let mut fields = BTreeMap::new();
        fields.insert("Definition".to_string(), "prose".to_string());
        let nested = SectionContent::Fields(fields);
        assert_eq!(
            serde_json::to_string(&nested).unwrap(),
            r#"{"Definition":"prose"}"#
        );
    }
}
