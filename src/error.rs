use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ScriptError {
    // ── Resource ──────────────────────────────────────────────────────────────
    #[error("Failed to open script {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while reading script: {0}")]
    Read(#[from] io::Error),

    // ── Format ───────────────────────────────────────────────────────────────
    #[error("Cannot extract a table name from insert statement: {line}")]
    MalformedInsert { line: String },

    // ── Validation ───────────────────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    Validate(String),
}
