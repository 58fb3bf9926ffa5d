//! Content fingerprinting for change detection and cache keying
//!
//! A row fingerprint covers every column name and value, so identical row
//! content always yields the same fingerprint and any single-cell change
//! yields a different one. Field fingerprints key the enrichment cache so
//! an unchanged cell hits cache even when the rest of its row changed.

use crate::models::SourceRow;
use sha2::{Digest, Sha256};

/// ASCII unit separator between a column name and its value
const FIELD_SEP: u8 = 0x1f;
/// ASCII record separator between cells
const CELL_SEP: u8 = 0x1e;

/// Fingerprint the full serialized contents of a source row
pub fn fingerprint_row(row: &SourceRow) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in &row.columns {
        hasher.update(name.as_bytes());
        hasher.update([FIELD_SEP]);
        hasher.update(value.as_bytes());
        hasher.update([CELL_SEP]);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a single cell's text (enrichment cache key material)
pub fn fingerprint_text(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    format!("{:x}", hash)
}
