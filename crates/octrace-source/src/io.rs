use octrace_types::{FileType, MessageRecord, PartRecord, SessionRecord};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;

use crate::mapper::{map_message, map_part, map_session};
use crate::schema::{MessageFile, PartFile, SessionFile};

/// A parsed record of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Session(SessionRecord),
    Message(MessageRecord),
    Part(PartRecord),
}

/// What reading one source file produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Parsed(SourceRecord),
    /// The file is empty, truncated or locked; retry later.
    NotReady(String),
    /// The content is complete but does not match the schema.
    Invalid(String),
    /// The file disappeared before it could be read.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRead {
    pub outcome: ReadOutcome,
    /// SHA-256 hex of the bytes read, if any were.
    pub checksum: Option<String>,
}

/// Read and parse one source file.
///
/// Never fails: every failure mode is folded into a [`ReadOutcome`] so one bad
/// file cannot abort a batch.
pub fn read_source(path: &Path, file_type: FileType) -> SourceRead {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return SourceRead {
                outcome: ReadOutcome::Missing,
                checksum: None,
            };
        }
        Err(err) => {
            return SourceRead {
                outcome: ReadOutcome::NotReady(format!("read failed: {}", err)),
                checksum: None,
            };
        }
    };

    let checksum = Some(hex::encode(Sha256::digest(&bytes)));
    let outcome = parse_bytes(&bytes, file_type, &path.to_string_lossy());

    SourceRead { outcome, checksum }
}

/// Parse in-memory file content.
pub fn parse_bytes(bytes: &[u8], file_type: FileType, source_path: &str) -> ReadOutcome {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return ReadOutcome::NotReady("empty file".to_string());
    }

    let mapped = match file_type {
        FileType::Session => decode::<SessionFile>(bytes)
            .map(|f| map_session(f, source_path).map(SourceRecord::Session)),
        FileType::Message => decode::<MessageFile>(bytes)
            .map(|f| map_message(f, source_path).map(SourceRecord::Message)),
        FileType::Part => {
            decode::<PartFile>(bytes).map(|f| map_part(f, source_path).map(SourceRecord::Part))
        }
    };

    match mapped {
        Ok(Ok(record)) => ReadOutcome::Parsed(record),
        Ok(Err(reason)) => ReadOutcome::Invalid(reason),
        Err(outcome) => outcome,
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ReadOutcome> {
    serde_json::from_slice(bytes).map_err(|err| match err.classify() {
        // A writer still appending produces JSON that ends early.
        Category::Eof | Category::Io => ReadOutcome::NotReady(err.to_string()),
        Category::Syntax | Category::Data => ReadOutcome::Invalid(err.to_string()),
    })
}
