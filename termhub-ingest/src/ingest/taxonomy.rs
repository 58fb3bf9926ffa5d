//! Section taxonomy and column classification
//!
//! Column headers follow the "Section – Subsection" convention (en dash,
//! hyphen as fallback). The section set is closed and versioned; headers
//! naming an unrecognized section land in an explicit unknown bucket
//! instead of being dropped or treated as open-ended dynamic keys.

/// Taxonomy version, bumped whenever the known-section set changes
pub const TAXONOMY_VERSION: u32 = 1;

/// The closed set of known content sections
pub const KNOWN_SECTIONS: [&str; 42] = [
    "Introduction",
    "Prerequisites",
    "Theoretical Concepts",
    "How It Works",
    "Variants or Extensions",
    "Applications",
    "Implementation",
    "Evaluation and Metrics",
    "Advantages and Disadvantages",
    "Ethics and Responsible AI",
    "Historical Context",
    "Illustration or Diagram",
    "Related Concepts",
    "Case Studies",
    "Interviews with Experts",
    "Hands-on Tutorials",
    "Interactive Elements",
    "Industry Insights",
    "Common Challenges and Pitfalls",
    "Real-world Datasets and Benchmarks",
    "Tools and Frameworks",
    "Did You Know?",
    "Quick Quiz",
    "Further Reading",
    "Project Suggestions",
    "Recommended Websites and Courses",
    "Collaboration and Community",
    "Research Papers",
    "Career Guidance",
    "Future Directions",
    "Glossary",
    "FAQs",
    "Tags and Keywords",
    "Appendices",
    "Index",
    "References",
    "Conclusion",
    "Metadata",
    "Best Practices",
    "Security Considerations",
    "Optimization Techniques",
    "Comparison with Alternatives",
];

/// Name of the bucket collecting columns with unrecognized sections
pub const UNKNOWN_SECTION: &str = "Unknown";

/// Whether a section name is part of the known taxonomy
pub fn is_known_section(name: &str) -> bool {
    KNOWN_SECTIONS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Canonical casing for a known section name
pub fn canonical_section(name: &str) -> Option<&'static str> {
    KNOWN_SECTIONS
        .iter()
        .find(|s| s.eq_ignore_ascii_case(name))
        .copied()
}

/// Role of one source column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    /// Column 0, the term name
    Identity,
    /// A content column within the taxonomy
    Section {
        /// Known section name (canonical casing), or [`UNKNOWN_SECTION`]
        section: String,
        /// Subsection name; empty when the header has no separator
        subsection: String,
        /// Configured as free text needing interpretation
        unstructured: bool,
    },
    /// Header was empty; the cell is ignored
    Blank,
}

/// Classified column set for one source file
#[derive(Debug, Clone)]
pub struct Taxonomy {
    /// Role per column, in file column order
    pub roles: Vec<ColumnRole>,
}

impl Taxonomy {
    /// Classify a header row.
    ///
    /// `unstructured_markers` are case-insensitive substrings; a header
    /// containing any of them escalates to enrichment when non-empty.
    pub fn from_headers(headers: &[String], unstructured_markers: &[String]) -> Self {
        let mut roles = Vec::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            if idx == 0 {
                roles.push(ColumnRole::Identity);
                continue;
            }
            let header = header.trim();
            if header.is_empty() {
                roles.push(ColumnRole::Blank);
                continue;
            }

            let (section, subsection) = split_header(header);
            let section = canonical_section(&section)
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN_SECTION.to_string());

            let lowered = header.to_lowercase();
            let unstructured = unstructured_markers
                .iter()
                .any(|marker| lowered.contains(&marker.to_lowercase()));

            roles.push(ColumnRole::Section {
                section,
                subsection,
                unstructured,
            });
        }
        Self { roles }
    }

    /// Role for the column at `idx`, Blank past the classified width
    pub fn role(&self, idx: usize) -> &ColumnRole {
        self.roles.get(idx).unwrap_or(&ColumnRole::Blank)
    }

    /// Number of distinct known sections present in the header row
    pub fn section_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for role in &self.roles {
            if let ColumnRole::Section { section, .. } = role {
                seen.insert(section.as_str());
            }
        }
        seen.len()
    }
}

/// Split a header into (section, subsection) on en dash, then hyphen
fn split_header(header: &str) -> (String, String) {
    if let Some((section, subsection)) = header.split_once('–') {
        return (section.trim().to_string(), subsection.trim().to_string());
    }
    if let Some((section, subsection)) = header.split_once('-') {
        return (section.trim().to_string(), subsection.trim().to_string());
    }
    (header.trim().to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_section_set_is_closed() {
        assert_eq!(KNOWN_SECTIONS.len(), 42);
        assert!(is_known_section("Introduction"));
        assert!(is_known_section("introduction"));
        assert!(!is_known_section("Totally Made Up"));
    }

    #[test]
    fn test_en_dash_split_preferred() {
        let (section, subsection) = split_header("Introduction – Definition and Overview");
        assert_eq!(section, "Introduction");
        assert_eq!(subsection, "Definition and Overview");
    }

    #[test]
    fn test_hyphen_fallback() {
        let (section, subsection) = split_header("Applications - Real-world Uses");
        assert_eq!(section, "Applications");
        // First hyphen wins; remainder kept whole
        assert_eq!(subsection, "Real-world Uses");
    }

    #[test]
    fn test_no_separator_is_bare_section() {
        let (section, subsection) = split_header("Conclusion");
        assert_eq!(section, "Conclusion");
        assert_eq!(subsection, "");
    }

    #[test]
    fn test_classification() {
        let markers = vec!["did you know".to_string()];
        let taxonomy = Taxonomy::from_headers(
            &headers(&[
                "Term",
                "Introduction – Definition and Overview",
                "Did You Know? – Fun Facts",
                "Mystery Column – Stuff",
                "",
            ]),
            &markers,
        );

        assert_eq!(taxonomy.role(0), &ColumnRole::Identity);
        assert_eq!(
            taxonomy.role(1),
            &ColumnRole::Section {
                section: "Introduction".to_string(),
                subsection: "Definition and Overview".to_string(),
                unstructured: false,
            }
        );
        assert_eq!(
            taxonomy.role(2),
            &ColumnRole::Section {
                section: "Did You Know?".to_string(),
                subsection: "Fun Facts".to_string(),
                unstructured: true,
            }
        );
        // Unrecognized section names go to the unknown bucket
        match taxonomy.role(3) {
            ColumnRole::Section { section, .. } => assert_eq!(section, UNKNOWN_SECTION),
            other => panic!("unexpected role: {:?}", other),
        }
        assert_eq!(taxonomy.role(4), &ColumnRole::Blank);
        // Past classified width
        assert_eq!(taxonomy.role(99), &ColumnRole::Blank);
    }

    #[test]
    fn test_section_count() {
        let taxonomy = Taxonomy::from_headers(
            &headers(&[
                "Term",
                "Introduction – Definition",
                "Introduction – Key Ideas",
                "Applications – NLP",
            ]),
            &[],
        );
        assert_eq!(taxonomy.section_count(), 2);
    }
}
