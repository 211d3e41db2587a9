//! Streaming utilities for processing large SQL dump scripts.
//!
//! This module provides the chunked script reader that splits a generated
//! data-load dump into bounded, transaction-wrapped batches, reading the
//! file incrementally so arbitrarily large scripts stay within a fixed
//! memory footprint.

mod chunk_reader;

pub use chunk_reader::{
    ChunkConfig, ChunkReader, BATCH_SEPARATOR, BEGIN_TRANSACTION, COMMIT_TRANSACTION,
    MAX_CHUNK_LINES,
};

pub(crate) use chunk_reader::{extract_table_name, INSERT_PREFIX};
