//! Row-to-record mapping
//!
//! Turns one raw row into a hierarchical record: change detection by
//! fingerprint, rule-based cell parsing, and enrichment for columns
//! marked unstructured. Enrichment failures degrade the field to its
//! rule-based parse; they never fail the row.

use crate::db::records::RecordStore;
use crate::enrich::EnrichmentClient;
use crate::error::{IngestError, IngestResult};
use crate::ingest::fingerprint::fingerprint_row;
use crate::ingest::taxonomy::{ColumnRole, Taxonomy};
use crate::models::{EnrichedRecord, EnrichmentMeta, SectionContent, SourceRow};
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFINITION_MAX_CHARS: usize = 500;
const SHORT_DEFINITION_MAX_CHARS: usize = 200;
const CATEGORY_MAX_CHARS: usize = 100;
/// Minimum length for a cell to stand in as a definition
const SUBSTANTIAL_CELL_CHARS: usize = 20;

/// Outcome of mapping one row
#[derive(Debug)]
pub enum MappedRow {
    /// Fingerprint matched the stored record; nothing to write
    SkippedUnchanged { slug: String },
    /// New or changed; ready for the batch
    Record(Box<EnrichedRecord>),
}

/// Maps source rows to enriched records
pub struct SectionMapper {
    taxonomy: Taxonomy,
    enricher: Arc<EnrichmentClient>,
    store: RecordStore,
    context: String,
    force_reprocess: bool,
}

impl SectionMapper {
    pub fn new(
        taxonomy: Taxonomy,
        enricher: Arc<EnrichmentClient>,
        store: RecordStore,
        context: String,
        force_reprocess: bool,
    ) -> Self {
        Self {
            taxonomy,
            enricher,
            store,
            context,
            force_reprocess,
        }
    }

    /// Map one row. Row-local problems come back as `RowParse`; transport
    /// errors propagate so the caller can pause the job.
    pub async fn map_row(&self, row: SourceRow) -> IngestResult<MappedRow> {
        let name = row
            .identity_cell()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            return Err(IngestError::RowParse {
                offset: row.offset,
                reason: "identity column is empty".to_string(),
            });
        }
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(IngestError::RowParse {
                offset: row.offset,
                reason: format!("term '{}' yields an empty slug", name),
            });
        }

        let fingerprint = fingerprint_row(&row);
        if !self.force_reprocess {
            if let Some(stored) = self.store.fingerprint_for_slug(&slug).await? {
                if stored == fingerprint {
                    return Ok(MappedRow::SkippedUnchanged { slug });
                }
            }
        }

        // section name -> cells in column order
        let mut grouped: BTreeMap<String, Vec<SectionCell>> = BTreeMap::new();
        let mut meta = EnrichmentMeta::default();

        for (idx, (header, value)) in row.columns.iter().enumerate() {
            let ColumnRole::Section {
                section,
                subsection,
                unstructured,
            } = self.taxonomy.role(idx)
            else {
                continue;
            };

            let raw = value.trim();
            let mut text = raw.to_string();

            if *unstructured && !raw.is_empty() {
                match self
                    .enricher
                    .enrich(&name, header, raw, &self.context)
                    .await
                {
                    Ok(field) => {
                        text = field.text;
                        meta.ai_fields.push(header.clone());
                    }
                    Err(IngestError::EnrichmentQuota(reason))
                    | Err(IngestError::EnrichmentService(reason)) => {
                        tracing::debug!(
                            term = %name,
                            column = %header,
                            reason = %reason,
                            "Enrichment unavailable, keeping rule-based parse"
                        );
                        meta.degraded_fields.push(header.clone());
                    }
                    Err(other) => return Err(other),
                }
            }

            grouped.entry(section.clone()).or_default().push(SectionCell {
                subsection: subsection.clone(),
                text,
            });
        }

        if !meta.ai_fields.is_empty() {
            meta.enriched_at = Some(chrono::Utc::now());
        }

        let sections = assemble_sections(grouped);
        let definition = derive_definition(&sections);
        let short_definition = definition
            .as_deref()
            .map(|text| cap_chars(first_sentence(text), SHORT_DEFINITION_MAX_CHARS));
        let category = derive_category(&sections, definition.as_deref());

        Ok(MappedRow::Record(Box::new(EnrichedRecord {
            slug,
            name,
            fingerprint,
            sections,
            definition,
            short_definition,
            category,
            meta,
            source_offset: row.offset,
        })))
    }
}

struct SectionCell {
    subsection: String,
    text: String,
}

/// Collapse grouped cells into section content.
///
/// A section with one unnamed cell gets its parsed content directly; any
/// named subsection promotes the whole section to a nested mapping.
fn assemble_sections(grouped: BTreeMap<String, Vec<SectionCell>>) -> BTreeMap<String, SectionContent> {
    let mut sections = BTreeMap::new();
    for (section, cells) in grouped {
        let has_named = cells.iter().any(|cell| !cell.subsection.is_empty());
        let content = if has_named {
            let mut fields = BTreeMap::new();
            for cell in cells {
                if cell.text.is_empty() {
                    continue;
                }
                let key = if cell.subsection.is_empty() {
                    "General".to_string()
                } else {
                    cell.subsection
                };
                fields
                    .entry(key)
                    .and_modify(|existing: &mut String| {
                        existing.push('\n');
                        existing.push_str(&cell.text);
                    })
                    .or_insert(cell.text);
            }
            SectionContent::Fields(fields)
        } else {
            let joined = cells
                .into_iter()
                .map(|cell| cell.text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            parse_cell(&joined)
        };
        sections.insert(section, content);
    }
    sections
}

/// Parse one cell into prose or a list.
///
/// Delimiter precedence is newline, then comma, then semicolon; the
/// first delimiter present wins. Commas split only tag-like content
/// where every item is a few words; a cell whose comma items read like
/// prose stays text rather than falling through to the semicolon.
pub fn parse_cell(text: &str) -> SectionContent {
    let text = text.trim();
    if text.contains('\n') {
        let items: Vec<String> = text
            .lines()
            .map(strip_bullet)
            .filter(|line| !line.is_empty())
            .collect();
        return SectionContent::List(items);
    }
    if text.contains(',') {
        let items: Vec<String> = text
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.len() >= 2 && items.iter().all(|item| item.split_whitespace().count() <= 5) {
            return SectionContent::List(items);
        }
        return SectionContent::Text(text.to_string());
    }
    if text.contains(';') {
        let items: Vec<String> = text
            .split(';')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.len() >= 2 {
            return SectionContent::List(items);
        }
    }
    SectionContent::Text(text.to_string())
}

fn strip_bullet(line: &str) -> String {
    line.trim()
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .to_string()
}

/// Identity key: lowercase alphanumerics, runs of anything else collapse
/// to single hyphens
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Pick the definition: an Introduction subsection named like
/// "definition" wins, then Introduction prose, then the first
/// substantial cell anywhere.
fn derive_definition(sections: &BTreeMap<String, SectionContent>) -> Option<String> {
    if let Some(content) = sections.get("Introduction") {
        match content {
            SectionContent::Fields(fields) => {
                for (subsection, text) in fields {
                    if subsection.to_lowercase().contains("definition") && !text.is_empty() {
                        return Some(cap_chars(text, DEFINITION_MAX_CHARS));
                    }
                }
                if let Some(text) = fields.values().find(|text| !text.is_empty()) {
                    return Some(cap_chars(text, DEFINITION_MAX_CHARS));
                }
            }
            SectionContent::Text(text) if !text.is_empty() => {
                return Some(cap_chars(text, DEFINITION_MAX_CHARS));
            }
            SectionContent::List(items) if !items.is_empty() => {
                return Some(cap_chars(&items.join(" "), DEFINITION_MAX_CHARS));
            }
            _ => {}
        }
    }

    for content in sections.values() {
        let candidate = match content {
            SectionContent::Text(text) => text.clone(),
            SectionContent::List(items) => items.join(" "),
            SectionContent::Fields(fields) => {
                fields.values().cloned().collect::<Vec<_>>().join(" ")
            }
        };
        let candidate = candidate.trim();
        if candidate.chars().count() >= SUBSTANTIAL_CELL_CHARS {
            return Some(cap_chars(candidate, DEFINITION_MAX_CHARS));
        }
    }
    None
}

/// Category: an explicit metadata subsection wins, then phrase patterns
/// in the definition text
fn derive_category(
    sections: &BTreeMap<String, SectionContent>,
    definition: Option<&str>,
) -> Option<String> {
    if let Some(SectionContent::Fields(fields)) = sections.get("Metadata") {
        for (subsection, text) in fields {
            if subsection.to_lowercase().contains("category") && !text.is_empty() {
                return Some(clean_category_name(text));
            }
        }
    }
    definition.and_then(extract_category_from_text)
}

/// Scan prose for "a type of X" / "in the field of X" style phrases
fn extract_category_from_text(text: &str) -> Option<String> {
    const MARKERS: [&str; 5] = [
        "is a type of ",
        "is a form of ",
        "is a branch of ",
        "in the field of ",
        "is a subfield of ",
    ];
    let lowered = text.to_lowercase();
    for marker in MARKERS {
        if let Some(pos) = lowered.find(marker) {
            let rest = &text[pos + marker.len()..];
            let phrase: String = rest
                .chars()
                .take_while(|ch| !matches!(ch, '.' | ',' | ';' | ':' | '(' | '\n'))
                .collect();
            let cleaned = clean_category_name(&phrase);
            if !cleaned.is_empty() {
                return Some(cleaned);
            }
        }
    }
    None
}

/// Normalize a category phrase: drop leading articles, title-case the
/// first letter, cap the length
fn clean_category_name(raw: &str) -> String {
    let mut text = raw.trim();
    for article in ["a ", "an ", "the "] {
        if text.to_lowercase().starts_with(article) {
            text = &text[article.len()..];
            break;
        }
    }
    let text = cap_chars(text.trim(), CATEGORY_MAX_CHARS);
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn first_sentence(text: &str) -> &str {
    match text.find(". ") {
        Some(pos) => &text[..pos + 1],
        None => text,
    }
}

fn cap_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::EnrichmentCache;
    use crate::db::init_memory_pool;
    use crate::enrich::{QuotaSet, ScriptedBackend};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    async fn mapper_with(
        backend: Arc<ScriptedBackend>,
        headers: &[&str],
        force_reprocess: bool,
    ) -> (SectionMapper, RecordStore) {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool.clone());
        let enricher = Arc::new(EnrichmentClient::new(
            backend,
            QuotaSet::new(100, 1000, 10000),
            RetryPolicy::new(2, Duration::from_millis(1)),
            EnrichmentCache::new(pool, 3600),
            Duration::from_millis(100),
            Duration::from_secs(5),
        ));
        let header_strings: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        let taxonomy = Taxonomy::from_headers(
            &header_strings,
            &["did you know".to_string(), "anecdote".to_string()],
        );
        let mapper = SectionMapper::new(
            taxonomy,
            enricher,
            store.clone(),
            "glossary-v1".to_string(),
            force_reprocess,
        );
        (mapper, store)
    }

    fn row(offset: u64, headers: &[&str], cells: &[&str]) -> SourceRow {
        SourceRow::new(
            offset,
            headers
                .iter()
                .zip(cells.iter())
                .map(|(header, cell)| (header.to_string(), cell.to_string()))
                .collect(),
        )
    }

    const HEADERS: [&str; 4] = [
        "Term",
        "Introduction – Definition and Overview",
        "Tags and Keywords",
        "Did You Know? – Fun Facts",
    ];

    #[tokio::test]
    async fn test_maps_structured_and_enriched_sections() {
        let backend = Arc::new(ScriptedBackend::new());
        let (mapper, _store) = mapper_with(Arc::clone(&backend), &HEADERS, false).await;

        let mapped = mapper
            .map_row(row(
                0,
                &HEADERS,
                &[
                    "Gradient Descent",
                    "Gradient descent is a type of optimization algorithm used to train models.",
                    "optimization, training, calculus",
                    "Cauchy described it in 1847",
                ],
            ))
            .await
            .unwrap();

        let MappedRow::Record(record) = mapped else {
            panic!("expected a record");
        };
        assert_eq!(record.slug, "gradient-descent");
        assert_eq!(record.name, "Gradient Descent");

        // Named subsection promotes Introduction to a nested mapping
        let Some(SectionContent::Fields(intro)) = record.sections.get("Introduction") else {
            panic!("expected nested Introduction");
        };
        assert!(intro.contains_key("Definition and Overview"));

        // Tag-like commas become a list
        assert_eq!(
            record.sections.get("Tags and Keywords"),
            Some(&SectionContent::List(vec![
                "optimization".to_string(),
                "training".to_string(),
                "calculus".to_string(),
            ]))
        );

        // Unstructured column went through the service
        assert_eq!(backend.calls(), 1);
        assert_eq!(record.meta.ai_fields, vec!["Did You Know? – Fun Facts"]);
        assert!(record.meta.enriched_at.is_some());

        assert_eq!(
            record.definition.as_deref(),
            Some("Gradient descent is a type of optimization algorithm used to train models.")
        );
        assert_eq!(
            record.category.as_deref(),
            Some("Optimization algorithm used to train models")
        );
    }

    #[tokio::test]
    async fn test_unchanged_row_skipped() {
        let backend = Arc::new(ScriptedBackend::new());
        let (mapper, store) = mapper_with(Arc::clone(&backend), &HEADERS, false).await;
        let source = row(
            0,
            &HEADERS,
            &["CNN", "A convolutional neural network for images.", "vision", ""],
        );

        let MappedRow::Record(record) = mapper.map_row(source.clone()).await.unwrap() else {
            panic!("expected a record");
        };
        let mut checkpoint = crate::models::CheckpointState::new(uuid::Uuid::new_v4());
        checkpoint.counts.succeeded = 1;
        store.commit_batch(&[*record], &checkpoint).await.unwrap();

        match mapper.map_row(source).await.unwrap() {
            MappedRow::SkippedUnchanged { slug } => assert_eq!(slug, "cnn"),
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_force_reprocess_bypasses_skip() {
        let backend = Arc::new(ScriptedBackend::new());
        let (mapper, store) = mapper_with(Arc::clone(&backend), &HEADERS, true).await;
        let source = row(
            0,
            &HEADERS,
            &["CNN", "A convolutional neural network for images.", "", ""],
        );

        let MappedRow::Record(record) = mapper.map_row(source.clone()).await.unwrap() else {
            panic!("expected a record");
        };
        let checkpoint = crate::models::CheckpointState::new(uuid::Uuid::new_v4());
        store.commit_batch(&[*record], &checkpoint).await.unwrap();

        // Same content still maps to a full record under force
        assert!(matches!(
            mapper.map_row(source).await.unwrap(),
            MappedRow::Record(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_identity_is_row_parse_error() {
        let backend = Arc::new(ScriptedBackend::new());
        let (mapper, _store) = mapper_with(backend, &HEADERS, false).await;

        let result = mapper
            .map_row(row(7, &HEADERS, &["   ", "text", "", ""]))
            .await;
        assert!(matches!(
            result,
            Err(IngestError::RowParse { offset: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_field() {
        let backend = Arc::new(ScriptedBackend::new());
        // Non-retryable failure on the single unstructured cell
        backend.push_err(false, "service rejected");
        let (mapper, _store) = mapper_with(Arc::clone(&backend), &HEADERS, false).await;

        let MappedRow::Record(record) = mapper
            .map_row(row(
                0,
                &HEADERS,
                &["CNN", "A convolutional network.", "", "trivia text"],
            ))
            .await
            .unwrap()
        else {
            panic!("expected a record");
        };

        assert!(record.meta.ai_fields.is_empty());
        assert_eq!(record.meta.degraded_fields, vec!["Did You Know? – Fun Facts"]);
        // The rule-based parse of the raw text survives
        let Some(SectionContent::Fields(facts)) = record.sections.get("Did You Know?") else {
            panic!("expected nested section");
        };
        assert_eq!(facts.get("Fun Facts").map(String::as_str), Some("trivia text"));
    }

    #[test]
    fn test_parse_cell_variants() {
        assert_eq!(
            parse_cell("just prose, with a clause in the middle of it"),
            SectionContent::Text("just prose, with a clause in the middle of it".to_string())
        );
        assert_eq!(
            parse_cell("- one\n- two\n- three"),
            SectionContent::List(vec!["one".into(), "two".into(), "three".into()])
        );
        assert_eq!(
            parse_cell("alpha; beta; gamma"),
            SectionContent::List(vec!["alpha".into(), "beta".into(), "gamma".into()])
        );
        assert_eq!(
            parse_cell("nlp, vision, speech"),
            SectionContent::List(vec!["nlp".into(), "vision".into(), "speech".into()])
        );
    }

    #[test]
    fn test_parse_cell_comma_outranks_semicolon() {
        assert_eq!(
            parse_cell("alpha; beta, gamma"),
            SectionContent::List(vec!["alpha; beta".into(), "gamma".into()])
        );
        // No comma present, so the semicolon gets its turn
        assert_eq!(
            parse_cell("alpha; beta gamma"),
            SectionContent::List(vec!["alpha".into(), "beta gamma".into()])
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Gradient Descent"), "gradient-descent");
        assert_eq!(slugify("K-Means (Clustering)"), "k-means-clustering");
        assert_eq!(slugify("  A/B  Testing  "), "a-b-testing");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_category_extraction() {
        assert_eq!(
            extract_category_from_text("BERT is a type of transformer model."),
            Some("Transformer model".to_string())
        );
        assert_eq!(
            extract_category_from_text("Used widely in the field of computer vision, it..."),
            Some("Computer vision".to_string())
        );
        assert_eq!(extract_category_from_text("No marker here."), None);
    }

    #[test]
    fn test_caps_respect_char_boundaries() {
        let long = "é".repeat(600);
        assert_eq!(cap_chars(&long, 500).chars().count(), 500);
    }
}
