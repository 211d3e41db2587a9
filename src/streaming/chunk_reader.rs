//! Chunked reading of large generated SQL data-load scripts.
//!
//! Splits a line-oriented dump file into bounded, independently executable
//! batches without ever holding the whole file in memory. Each batch is a
//! contiguous run of `INSERT` statements targeting one table (plus any lines
//! ahead of the first insert), wrapped in transaction markers and terminated
//! by a batch separator so the caller can submit it as one execution unit.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use encoding_rs::{Encoding, WINDOWS_1252};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};

use crate::error::ScriptError;

/// Marker opening the transactional scope of a chunk.
pub const BEGIN_TRANSACTION: &str = "BEGIN TRANSACTION";

/// Marker closing the transactional scope of a chunk.
pub const COMMIT_TRANSACTION: &str = "COMMIT TRANSACTION";

/// Batch separator terminating every chunk.
pub const BATCH_SEPARATOR: &str = "GO";

/// Hard cap on the number of lines accumulated into one chunk.
///
/// Reaching the cap is a designed truncation point, not an error: the chunk
/// is closed normally and the remaining lines for the same table continue in
/// the next chunk.
pub const MAX_CHUNK_LINES: usize = 131072;

/// Line prefix marking an insert statement.
pub(crate) const INSERT_PREFIX: &str = "INSERT INTO";

/// Separator used when joining accumulated lines into chunk text.
const LINE_SEPARATOR: &str = "\r\n";

/// Configuration for chunked script reading.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Encoding assumed when the file carries no byte-order mark.
    pub fallback_encoding: &'static Encoding,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            fallback_encoding: WINDOWS_1252,
        }
    }
}

impl ChunkConfig {
    /// Sets the encoding used when no byte-order mark is present.
    pub fn fallback_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.fallback_encoding = encoding;
        self
    }
}

/// Lookahead state carried between [`ChunkReader::next_chunk`] calls.
///
/// At most one line of lookahead exists at any time. The tagged states keep
/// resumption and exhaustion distinct: a buffered boundary line becomes the
/// first line of the next chunk, while end of stream is terminal.
#[derive(Debug)]
enum Cursor {
    /// No lookahead; the next line comes straight from the stream.
    StreamStart,
    /// One line read past the previous chunk's boundary.
    Buffered(String),
    /// The stream has ended; every further call yields no chunk.
    Exhausted,
}

/// Streaming reader that splits a SQL dump script into executable batches.
///
/// The reader owns its file handle for the whole lifetime of the instance and
/// releases it on every exit path: an explicit [`close`](Self::close), a drop
/// after a failed read, or a normal drop. No state is held beyond the single
/// pending-line lookahead, so memory stays bounded regardless of file size.
///
/// Not safe for shared concurrent use; callers must serialize access.
pub struct ChunkReader {
    reader: Option<BufReader<DecodeReaderBytes<File, Vec<u8>>>>,
    cursor: Cursor,
}

impl ChunkReader {
    /// Opens a script for chunked reading with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Open`] if the file cannot be opened (missing,
    /// permission denied, locked).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        Self::open_with_config(path, ChunkConfig::default())
    }

    /// Opens a script for chunked reading.
    ///
    /// The text encoding is detected from a byte-order mark when one is
    /// present; otherwise `config.fallback_encoding` is assumed. Decoding is
    /// layered over the stream, so the file is never read ahead of demand.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Open`] if the file cannot be opened.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: ChunkConfig,
    ) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ScriptError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let decoder = DecodeReaderBytesBuilder::new()
            .encoding(Some(config.fallback_encoding))
            .bom_override(true)
            .build(file);

        Ok(Self {
            reader: Some(BufReader::new(decoder)),
            cursor: Cursor::StreamStart,
        })
    }

    /// Reads and assembles the next batch from the script.
    ///
    /// Returns `Ok(Some(text))` with a self-contained, transaction-wrapped
    /// batch, or `Ok(None)` once the script is exhausted. Each batch holds
    /// any lines ahead of the first insert statement plus the contiguous run
    /// of inserts for one table, capped at [`MAX_CHUNK_LINES`] lines.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Read`] if the underlying stream fails and
    /// [`ScriptError::MalformedInsert`] if an insert line does not follow the
    /// `[schema].[Table] (` naming convention. Either aborts the remaining
    /// stream for this file; chunks already returned stay valid.
    pub fn next_chunk(&mut self) -> Result<Option<String>, ScriptError> {
        // Resolve the first line: the pending lookahead wins over the stream.
        let mut current = match std::mem::replace(&mut self.cursor, Cursor::StreamStart) {
            Cursor::Exhausted => {
                self.cursor = Cursor::Exhausted;
                return Ok(None);
            }
            Cursor::Buffered(line) => Some(line),
            Cursor::StreamStart => self.read_source_line()?,
        };

        let mut lines: Vec<String> = Vec::new();

        // Preamble phase: schema DDL, comments and anything else ahead of the
        // first insert statement goes into the chunk verbatim.
        loop {
            match current {
                Some(line) if !line.is_empty() && !line.starts_with(INSERT_PREFIX) => {
                    lines.push(line);
                    current = self.read_source_line()?;
                }
                other => {
                    current = other;
                    break;
                }
            }
        }

        // A non-empty line at this point is the first insert of a table
        // block; it pins the table for the rest of the chunk.
        let table = match current.as_deref() {
            Some(line) if !line.is_empty() => Some(extract_table_name(line)?.to_string()),
            _ => None,
        };

        if let Some(table) = table {
            #[cfg(debug_assertions)]
            tracing::debug!(table = %table, "Detected insert block");

            // Membership in the block is keyed on the bracket-delimited
            // occurrence of the name, so a short table name cannot match
            // inside unrelated text on the line.
            let table_ref = format!(".[{}]", table);

            loop {
                match current {
                    Some(mut line)
                        if !line.is_empty()
                            && line.contains(table_ref.as_str())
                            && lines.len() < MAX_CHUNK_LINES =>
                    {
                        // A statement wrapped over two physical lines is
                        // merged before the append. Single-level only: the
                        // merged result is not re-checked.
                        if line.starts_with(INSERT_PREFIX) && !line.ends_with(')') {
                            if let Some(continuation) = self.read_source_line()? {
                                line.push_str(&continuation);
                            }
                        }
                        lines.push(line);
                        current = self.read_source_line()?;
                    }
                    other => {
                        current = other;
                        break;
                    }
                }
            }
        }

        // Boundary handoff: the line that stopped the block resumes the next
        // chunk. An empty line is a bare separator and is not carried over.
        self.cursor = match current {
            None => Cursor::Exhausted,
            Some(line) if line.is_empty() => Cursor::StreamStart,
            Some(line) => Cursor::Buffered(line),
        };

        if lines.is_empty() {
            return Ok(None);
        }

        let ends_with_commit = lines
            .last()
            .is_some_and(|line| line.eq_ignore_ascii_case(COMMIT_TRANSACTION));
        if !ends_with_commit {
            lines.push(COMMIT_TRANSACTION.to_string());
        }
        lines.push(BATCH_SEPARATOR.to_string());

        #[cfg(debug_assertions)]
        tracing::debug!(line_count = lines.len(), "Completed chunk");

        let mut contents = lines.join(LINE_SEPARATOR);
        if !contains_ignore_ascii_case(&contents, BEGIN_TRANSACTION) {
            contents.insert_str(0, &format!("{}{}", BEGIN_TRANSACTION, LINE_SEPARATOR));
        }

        Ok(Some(contents))
    }

    /// Releases the underlying file handle.
    ///
    /// Safe to call more than once; subsequent calls are no-ops. After
    /// closing, [`next_chunk`](Self::next_chunk) behaves as if the stream
    /// had ended.
    pub fn close(&mut self) {
        self.reader = None;
    }

    /// Reads one physical line from the source, without its line terminator.
    ///
    /// Returns `Ok(None)` at end of stream or when the reader has been
    /// closed.
    fn read_source_line(&mut self) -> Result<Option<String>, ScriptError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Ok(Some(line))
            }
            Err(e) => Err(ScriptError::Read(e)),
        }
    }
}

/// Extracts the table name from an insert statement shaped like
/// `INSERT INTO [schema].[Table] (Column, ...) VALUES (...)`.
///
/// The rule is intentionally strict positional arithmetic: the name is the
/// text between the `.[` schema-qualifier delimiter and the column list's
/// opening parenthesis, minus the `] ` that closes the bracketed name. Lines
/// that do not follow the convention are rejected rather than guessed at,
/// since a wrong table name would corrupt chunk boundaries.
pub(crate) fn extract_table_name(line: &str) -> Result<&str, ScriptError> {
    let malformed = || ScriptError::MalformedInsert {
        line: line.to_string(),
    };

    let start = line.find(".[").map(|idx| idx + 2).ok_or_else(malformed)?;
    let paren = line.find('(').ok_or_else(malformed)?;
    let end = paren.checked_sub(2).filter(|e| *e >= start).ok_or_else(malformed)?;

    line.get(start..end).ok_or_else(malformed)
}

/// Case-insensitive containment check for marker tokens.
fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper to write a script file and return its path.
    fn write_script(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("script.sql");
        fs::write(&path, content).expect("Failed to write test script");
        path
    }

    /// Helper to drain a reader into the list of produced chunks.
    fn collect_chunks(reader: &mut ChunkReader) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().expect("next_chunk failed") {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_comment_only_file() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "-- comment\r\n");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunk = reader.next_chunk().unwrap().expect("expected one chunk");

        assert_eq!(
            chunk,
            "BEGIN TRANSACTION\r\n-- comment\r\nCOMMIT TRANSACTION\r\nGO"
        );
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_empty_file_is_immediately_exhausted() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        assert!(reader.next_chunk().unwrap().is_none());
        // Exhaustion is terminal.
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_table_change_starts_new_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "INSERT INTO [dbo].[T] (a) VALUES (1)\r\n\
             INSERT INTO [dbo].[T] (a) VALUES (2)\r\n\
             INSERT INTO [dbo].[U] (a) VALUES (3)\r\n",
        );

        let mut reader = ChunkReader::open(&path).expect("open failed");

        let first = reader.next_chunk().unwrap().expect("expected first chunk");
        assert_eq!(
            first,
            "BEGIN TRANSACTION\r\n\
             INSERT INTO [dbo].[T] (a) VALUES (1)\r\n\
             INSERT INTO [dbo].[T] (a) VALUES (2)\r\n\
             COMMIT TRANSACTION\r\nGO"
        );

        let second = reader.next_chunk().unwrap().expect("expected second chunk");
        assert!(
            second.contains("INSERT INTO [dbo].[U] (a) VALUES (3)"),
            "got: {}",
            second
        );
        // The boundary line carried over from the first call leads the chunk
        // body, right after the injected transaction start.
        assert!(
            second.starts_with("BEGIN TRANSACTION\r\nINSERT INTO [dbo].[U]"),
            "got: {}",
            second
        );

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_preamble_and_inserts_share_one_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "-- generated data load\r\n\
             SET IDENTITY_INSERT [dbo].[Orders] ON\r\n\
             INSERT INTO [dbo].[Orders] (Id) VALUES (1)\r\n\
             INSERT INTO [dbo].[Orders] (Id) VALUES (2)\r\n",
        );

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunks = collect_chunks(&mut reader);

        assert_eq!(chunks.len(), 1);
        let lines: Vec<&str> = chunks[0].split("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "BEGIN TRANSACTION",
                "-- generated data load",
                "SET IDENTITY_INSERT [dbo].[Orders] ON",
                "INSERT INTO [dbo].[Orders] (Id) VALUES (1)",
                "INSERT INTO [dbo].[Orders] (Id) VALUES (2)",
                "COMMIT TRANSACTION",
                "GO",
            ]
        );
    }

    #[test]
    fn test_wrapped_insert_is_merged_once() {
        let dir = TempDir::new().unwrap();
        // The first statement is wrapped over two physical lines: the first
        // half does not end with a closing parenthesis.
        let path = write_script(
            &dir,
            "INSERT INTO [dbo].[T] (a, b) VALUES (1,\r\n'two')\r\n\
             INSERT INTO [dbo].[T] (a, b) VALUES (2, 'x')\r\n",
        );

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunks = collect_chunks(&mut reader);

        assert_eq!(chunks.len(), 1);
        let lines: Vec<&str> = chunks[0].split("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "BEGIN TRANSACTION",
                "INSERT INTO [dbo].[T] (a, b) VALUES (1,'two')",
                "INSERT INTO [dbo].[T] (a, b) VALUES (2, 'x')",
                "COMMIT TRANSACTION",
                "GO",
            ]
        );
    }

    #[test]
    fn test_line_cap_splits_table_without_loss() {
        let dir = TempDir::new().unwrap();
        let total = MAX_CHUNK_LINES + 1;
        let mut content = String::with_capacity(total * 48);
        for i in 0..total {
            content.push_str(&format!(
                "INSERT INTO [dbo].[Big] (n) VALUES ({})\r\n",
                i
            ));
        }
        let path = write_script(&dir, &content);

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunks = collect_chunks(&mut reader);
        assert_eq!(chunks.len(), 2);

        let count_inserts = |chunk: &str| {
            chunk
                .split("\r\n")
                .filter(|l| l.starts_with(INSERT_PREFIX))
                .count()
        };
        assert_eq!(count_inserts(&chunks[0]), MAX_CHUNK_LINES);
        assert_eq!(count_inserts(&chunks[1]), 1);

        // The overflow line is exactly the one that did not fit, neither
        // lost nor duplicated across the split.
        assert!(chunks[1].contains(&format!("VALUES ({})", MAX_CHUNK_LINES)));
        assert!(!chunks[0].contains(&format!("VALUES ({})", MAX_CHUNK_LINES)));
    }

    #[test]
    fn test_existing_begin_transaction_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "begin transaction\r\nINSERT INTO [dbo].[T] (a) VALUES (1)\r\n",
        );

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunk = reader.next_chunk().unwrap().expect("expected one chunk");

        // The marker check is case-insensitive, so the lowercase original is
        // kept and no second marker is prepended.
        assert!(chunk.starts_with("begin transaction\r\n"), "got: {}", chunk);
        assert_eq!(chunk.to_ascii_lowercase().matches("begin transaction").count(), 1);
    }

    #[test]
    fn test_existing_commit_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "-- cleanup\r\ncommit transaction\r\n");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunk = reader.next_chunk().unwrap().expect("expected one chunk");

        let lines: Vec<&str> = chunk.split("\r\n").collect();
        assert_eq!(
            lines,
            vec!["BEGIN TRANSACTION", "-- cleanup", "commit transaction", "GO"]
        );
    }

    #[test]
    fn test_blank_line_terminates_chunk_and_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "-- first\r\n\r\n-- second\r\n");

        let mut reader = ChunkReader::open(&path).expect("open failed");

        let first = reader.next_chunk().unwrap().expect("expected first chunk");
        assert!(first.contains("-- first"));
        assert!(!first.contains("-- second"));

        let second = reader.next_chunk().unwrap().expect("expected second chunk");
        assert!(second.contains("-- second"));

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_malformed_insert_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "INSERT INTO Orders VALUES (1)\r\n");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let err = reader.next_chunk().expect_err("expected a format violation");
        match err {
            ScriptError::MalformedInsert { line } => {
                assert_eq!(line, "INSERT INTO Orders VALUES (1)");
            }
            other => panic!("expected MalformedInsert, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("does_not_exist.sql");

        match ChunkReader::open(&path) {
            Err(ScriptError::Open { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Open error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "-- comment\r\n");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        reader.close();
        reader.close();
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_utf16_bom_overrides_fallback_encoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("utf16.sql");

        // UTF-16LE BOM followed by "-- données\r\n".
        let text = "-- données\r\n";
        let mut bytes: Vec<u8> = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&path, &bytes).expect("Failed to write test script");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunk = reader.next_chunk().unwrap().expect("expected one chunk");
        assert!(chunk.contains("-- données"), "got: {}", chunk);
    }

    #[test]
    fn test_fallback_encoding_decodes_legacy_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp1252.sql");

        // "-- caf\xE9" in Windows-1252, no byte-order mark.
        fs::write(&path, b"-- caf\xE9\r\n").expect("Failed to write test script");

        let mut reader = ChunkReader::open(&path).expect("open failed");
        let chunk = reader.next_chunk().unwrap().expect("expected one chunk");
        assert!(chunk.contains("-- café"), "got: {}", chunk);
    }

    #[test]
    fn test_extract_table_name_basic() {
        let line = "INSERT INTO [dbo].[Orders] (Id, Name) VALUES (1, 'a')";
        assert_eq!(extract_table_name(line).unwrap(), "Orders");
    }

    #[test]
    fn test_extract_table_name_missing_qualifier() {
        let line = "INSERT INTO Orders (Id) VALUES (1)";
        assert!(matches!(
            extract_table_name(line),
            Err(ScriptError::MalformedInsert { .. })
        ));
    }

    #[test]
    fn test_extract_table_name_missing_paren() {
        let line = "INSERT INTO [dbo].[Orders] VALUES";
        assert!(matches!(
            extract_table_name(line),
            Err(ScriptError::MalformedInsert { .. })
        ));
    }

    #[test]
    fn test_extract_table_name_paren_before_qualifier() {
        // The positional rule would compute a negative-length name here; the
        // line is rejected instead.
        let line = "INSERT INTO (Id) VALUES .[Orders]";
        assert!(matches!(
            extract_table_name(line),
            Err(ScriptError::MalformedInsert { .. })
        ));
    }
}
