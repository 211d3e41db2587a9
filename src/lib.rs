//! Streaming batch reader for large generated SQL data-load scripts.
//!
//! A multi-gigabyte dump of `INSERT` statements cannot be handed to a
//! database as one command. This crate splits such a script into bounded,
//! independently executable batches, one table at a time, without loading
//! the file into memory. Each batch is wrapped in explicit transaction
//! markers and terminated by a batch separator, so a migration engine can
//! stream-execute the script one unit at a time.
//!
//! ```no_run
//! use bulkscript::ChunkReader;
//!
//! # fn main() -> Result<(), bulkscript::ScriptError> {
//! let mut reader = ChunkReader::open("data/load_orders.sql")?;
//! while let Some(batch) = reader.next_chunk()? {
//!     // Hand `batch` to the database as one execution unit.
//! }
//! reader.close();
//! # Ok(())
//! # }
//! ```
//!
//! The executing engine is out of scope: callers pick which files need
//! chunked reading, run every batch in order without skipping, split on the
//! embedded `GO` separators, and record success or failure in their own
//! tracking store.

pub mod error;
pub mod streaming;
pub mod validation;

pub use error::ScriptError;
pub use streaming::{
    ChunkConfig, ChunkReader, BATCH_SEPARATOR, BEGIN_TRANSACTION, COMMIT_TRANSACTION,
    MAX_CHUNK_LINES,
};
pub use validation::{validate, ScriptValidationResult};
