//! Dump script validation with sample-based approach for large files.
//!
//! This module validates SQL dump scripts by reading only a fixed-size
//! sample (512 KB), making it safe for very large files while still catching
//! common issues:
//! - Empty files
//! - Insert statements the chunk reader would reject
//! - Line ending inconsistencies
//! - Byte-order marks and their detected encodings

use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::streaming::{extract_table_name, INSERT_PREFIX};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the sample buffer for validation (512 KB).
pub const VALIDATION_SAMPLE_SIZE: usize = 512 * 1024;

/// File size threshold for the large file warning (100 MB).
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Result of script validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptValidationResult {
    /// Whether the file passed validation (no errors).
    pub ok: bool,
    /// List of validation errors found.
    pub errors: Vec<ScriptValidationError>,
    /// List of validation warnings found.
    pub warnings: Vec<ScriptValidationWarning>,
    /// Statistics about the file.
    pub stats: ScriptValidationStats,
}

/// Statistics collected during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptValidationStats {
    /// Total file size in bytes.
    pub file_size_bytes: u64,
    /// Number of bytes actually validated (sample size or file size if smaller).
    pub sample_bytes: u64,
    /// Detected line ending style.
    pub line_endings: LineEndings,
    /// Number of insert statements seen in the sample.
    pub insert_lines_in_sample: u64,
    /// Distinct table names seen in the sample, in first-seen order.
    pub tables_in_sample: Vec<String>,
    /// Estimated total insert count extrapolated from the sample.
    pub estimated_total_inserts: Option<u64>,
}

/// Detected line ending style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEndings {
    /// Unix-style line endings (\n).
    LF,
    /// Windows-style line endings (\r\n).
    CRLF,
    /// Mixed line endings (both \n and \r\n found).
    Mixed,
    /// No line endings detected (single line or empty).
    Unknown,
}

/// Validation errors that prevent chunked execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptValidationError {
    /// File is empty (0 bytes).
    EmptyFile,
    /// An insert statement the chunk reader cannot extract a table name from.
    MalformedInsert {
        /// 1-based row number where the statement was found.
        row: u64,
    },
}

/// Validation warnings that don't prevent processing but may indicate issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptValidationWarning {
    /// File starts with a byte-order mark.
    HasBom {
        /// Name of the encoding the mark identifies.
        encoding: String,
    },
    /// The sample contains no insert statements; whole-file handling is
    /// likely a better fit than chunked reading.
    NoInserts,
    /// File is larger than 100 MB.
    LargeFile {
        /// File size in bytes.
        size_bytes: u64,
    },
    /// File contains mixed line endings.
    MixedLineEndings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Validates a dump script using a sample-based approach.
///
/// This function reads only the first [`VALIDATION_SAMPLE_SIZE`] bytes of the
/// file, making it safe for very large files.
///
/// # Arguments
///
/// * `path` - Path to the script file to validate
///
/// # Returns
///
/// A `ScriptValidationResult` containing errors, warnings, and statistics.
///
/// # Errors
///
/// Returns `ScriptError::Validate` only for catastrophic I/O failures.
/// Normal validation errors are returned in `ScriptValidationResult.errors`.
pub fn validate(path: &Path) -> Result<ScriptValidationResult, ScriptError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Step 1: File metadata
    let metadata = std::fs::metadata(path)
        .map_err(|e| ScriptError::Validate(format!("Failed to read file metadata: {}", e)))?;

    let file_size_bytes = metadata.len();

    if file_size_bytes == 0 {
        return Ok(ScriptValidationResult {
            ok: false,
            errors: vec![ScriptValidationError::EmptyFile],
            warnings: vec![],
            stats: ScriptValidationStats {
                file_size_bytes: 0,
                sample_bytes: 0,
                line_endings: LineEndings::Unknown,
                insert_lines_in_sample: 0,
                tables_in_sample: vec![],
                estimated_total_inserts: None,
            },
        });
    }

    if file_size_bytes > LARGE_FILE_THRESHOLD {
        warnings.push(ScriptValidationWarning::LargeFile {
            size_bytes: file_size_bytes,
        });
    }

    // Step 2: Read the sample buffer
    let sample_size = (file_size_bytes as usize).min(VALIDATION_SAMPLE_SIZE);
    let mut buffer = vec![0u8; sample_size];

    let mut file = File::open(path)
        .map_err(|e| ScriptError::Validate(format!("Failed to open file: {}", e)))?;

    file.read_exact(&mut buffer)
        .map_err(|e| ScriptError::Validate(format!("Failed to read file: {}", e)))?;

    let sample_bytes = sample_size as u64;
    let is_sample_only = file_size_bytes > sample_bytes;

    // Step 3: Byte-order mark and decode
    let bom = Encoding::for_bom(&buffer);
    if let Some((encoding, _)) = bom {
        warnings.push(ScriptValidationWarning::HasBom {
            encoding: encoding.name().to_string(),
        });
    }
    let (encoding, _) = bom.unwrap_or((encoding_rs::UTF_8, 0));
    let (decoded, _had_errors) = encoding.decode_with_bom_removal(&buffer);
    let text: &str = &decoded;

    // Step 4: Line endings
    let line_endings = detect_line_endings(text);
    if line_endings == LineEndings::Mixed {
        warnings.push(ScriptValidationWarning::MixedLineEndings);
    }

    // Step 5: Scan the sampled lines. When only a sample was read, the last
    // line may be cut mid-statement and is skipped.
    let scan: &str = if is_sample_only {
        match text.rfind('\n') {
            Some(idx) => &text[..idx + 1],
            None => "",
        }
    } else {
        text
    };

    let mut insert_lines_in_sample: u64 = 0;
    let mut tables_in_sample: Vec<String> = Vec::new();

    for (idx, line) in scan.lines().enumerate() {
        if !line.starts_with(INSERT_PREFIX) {
            continue;
        }
        insert_lines_in_sample += 1;

        match extract_table_name(line) {
            Ok(table) => {
                if !tables_in_sample.iter().any(|t| t == table) {
                    tables_in_sample.push(table.to_string());
                }
            }
            Err(_) => {
                errors.push(ScriptValidationError::MalformedInsert {
                    row: idx as u64 + 1,
                });
            }
        }
    }

    if insert_lines_in_sample == 0 {
        warnings.push(ScriptValidationWarning::NoInserts);
    }

    // Step 6: Estimate total inserts
    let estimated_total_inserts = if insert_lines_in_sample == 0 {
        None
    } else if is_sample_only {
        let scanned_bytes = scan.len().max(1) as f64;
        let scaled = insert_lines_in_sample as f64 * file_size_bytes as f64 / scanned_bytes;
        Some(scaled.round() as u64)
    } else {
        Some(insert_lines_in_sample)
    };

    let ok = errors.is_empty();

    Ok(ScriptValidationResult {
        ok,
        errors,
        warnings,
        stats: ScriptValidationStats {
            file_size_bytes,
            sample_bytes,
            line_endings,
            insert_lines_in_sample,
            tables_in_sample,
            estimated_total_inserts,
        },
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Detects line ending style in the given text.
fn detect_line_endings(text: &str) -> LineEndings {
    let mut has_lf = false;
    let mut has_crlf = false;

    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
            has_crlf = true;
            i += 2;
        } else if bytes[i] == b'\n' {
            has_lf = true;
            i += 1;
        } else {
            i += 1;
        }
    }

    match (has_lf, has_crlf) {
        (true, true) => LineEndings::Mixed,
        (true, false) => LineEndings::LF,
        (false, true) => LineEndings::CRLF,
        (false, false) => LineEndings::Unknown,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
