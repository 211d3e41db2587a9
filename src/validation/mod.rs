//! Script validation module for sample-based file validation.
//!
//! Provides fast pre-flight validation of SQL dump scripts by reading only a
//! fixed-size sample, making it safe for very large files (GBs).

pub mod script_validator;

pub use script_validator::{
    validate, LineEndings, ScriptValidationError, ScriptValidationResult, ScriptValidationStats,
    ScriptValidationWarning, VALIDATION_SAMPLE_SIZE,
};
