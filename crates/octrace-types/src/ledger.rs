use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Record type of a source file, decided by its top-level directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Session,
    Message,
    Part,
}

impl FileType {
    /// Load order for the bulk pass: parents before children.
    pub const ALL: [FileType; 3] = [FileType::Session, FileType::Message, FileType::Part];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Session => "session",
            FileType::Message => "message",
            FileType::Part => "part",
        }
    }

    /// Directory name under the storage root holding files of this type.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(FileType::Session),
            "message" => Ok(FileType::Message),
            "part" => Ok(FileType::Part),
            other => Err(Error::unknown("file type", other)),
        }
    }
}

/// Outcome recorded in the ledger for one file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Observed but not yet readable (partial write, locked)
    Pending,
    Processed,
    /// Content did not match the schema; see `IndexedFile::error`
    Failed,
    Skipped,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processed => "processed",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "processed" => Ok(FileStatus::Processed),
            "failed" => Ok(FileStatus::Failed),
            "skipped" => Ok(FileStatus::Skipped),
            other => Err(Error::unknown("file status", other)),
        }
    }
}

/// Ledger entry: which version of a file has been ingested and how it went.
///
/// Keyed by `file_path`. Updated in place when the file's mtime advances,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub file_path: String,
    pub file_type: FileType,
    /// Source mtime as float epoch seconds.
    pub last_modified: f64,
    /// RFC 3339 timestamp of the ledger write.
    pub processed_at: String,
    /// SHA-256 hex of the file bytes, when they could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub status: FileStatus,
    /// Failure reason for `Failed` / `Pending` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexedFile {
    /// Entry for a file that was parsed and written to the raw tables.
    pub fn processed(
        file_path: impl Into<String>,
        file_type: FileType,
        last_modified: f64,
        checksum: Option<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            last_modified,
            processed_at: String::new(),
            checksum,
            status: FileStatus::Processed,
            error: None,
        }
    }

    pub fn with_status(mut self, status: FileStatus, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self
    }
}
