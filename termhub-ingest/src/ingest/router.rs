//! Source format detection and intake strategy selection
//!
//! Format is sniffed from content first (magic bytes), extension second.
//! The strategy decision is size- and format-driven so memory use stays
//! bounded regardless of input size.

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use std::path::Path;

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
    Xlsx,
}

impl SourceFormat {
    pub fn label(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::Xlsx => "xlsx",
        }
    }
}

/// How the source will be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStrategy {
    /// Parse the whole file in memory with the native parser
    Direct,
    /// Stream rows incrementally with the native parser
    StreamingNative,
    /// Normalize to a row-wise temporary file, then stream that
    ForcedRowWise,
}

impl IntakeStrategy {
    pub fn label(self) -> &'static str {
        match self {
            IntakeStrategy::Direct => "direct",
            IntakeStrategy::StreamingNative => "streaming-native",
            IntakeStrategy::ForcedRowWise => "forced-row-wise",
        }
    }
}

/// Detect the source format, content sniffing before extension
pub fn detect_format(path: &Path) -> IngestResult<SourceFormat> {
    // XLSX is a zip container; infer identifies it reliably
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        match kind.extension() {
            "xlsx" => return Ok(SourceFormat::Xlsx),
            // Plain zip from older exporters still means a workbook here
            "zip" => return Ok(SourceFormat::Xlsx),
            _ => {}
        }
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" => Ok(SourceFormat::Csv),
        "json" => Ok(SourceFormat::Json),
        "xlsx" | "xlsm" => Ok(SourceFormat::Xlsx),
        other => Err(IngestError::SourceRead(format!(
            "Unsupported source format: '{}' ({})",
            other,
            path.display()
        ))),
    }
}

/// Pick the intake strategy from format and file size
pub fn select_strategy(
    format: SourceFormat,
    file_size_bytes: u64,
    config: &IngestConfig,
) -> IntakeStrategy {
    match format {
        // CSV streams natively at any size
        SourceFormat::Csv => IntakeStrategy::StreamingNative,
        SourceFormat::Json => {
            if file_size_bytes <= config.direct_max_bytes {
                IntakeStrategy::Direct
            } else if file_size_bytes <= config.stream_max_bytes {
                IntakeStrategy::StreamingNative
            } else {
                IntakeStrategy::ForcedRowWise
            }
        }
        // The workbook parser has no incremental mode
        SourceFormat::Xlsx => {
            if file_size_bytes <= config.direct_max_bytes {
                IntakeStrategy::Direct
            } else {
                IntakeStrategy::ForcedRowWise
            }
        }
    }
}
