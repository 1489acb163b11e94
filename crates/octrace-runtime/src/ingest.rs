use octrace_index::IngestBatch;
use octrace_source::{ReadOutcome, SourceRead, SourceRecord};
use octrace_types::{FileStatus, FileType, IndexedFile, TypeStats};

/// How one file landed in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staged {
    Record,
    NotReady,
    Invalid,
    Missing,
}

impl Staged {
    pub(crate) fn count(self, stats: &mut TypeStats) {
        match self {
            Staged::Record => stats.records += 1,
            Staged::NotReady => stats.not_ready += 1,
            Staged::Invalid => stats.failed += 1,
            Staged::Missing => {}
        }
    }
}

/// Add the outcome of reading `path` to `batch`: the record plus a
/// `processed` stamp, a `pending` stamp for unreadable files, or a `failed`
/// stamp with the reason. Vanished files leave no trace.
pub(crate) fn stage(
    batch: &mut IngestBatch,
    path: String,
    file_type: FileType,
    mtime: f64,
    read: SourceRead,
) -> Staged {
    match read.outcome {
        ReadOutcome::Parsed(record) => {
            match record {
                SourceRecord::Session(s) => batch.sessions.push(s),
                SourceRecord::Message(m) => batch.messages.push(m),
                SourceRecord::Part(p) => batch.parts.push(p),
            }
            batch
                .ledger
                .push(IndexedFile::processed(path, file_type, mtime, read.checksum));
            Staged::Record
        }
        ReadOutcome::NotReady(reason) => {
            tracing::debug!(path = %path, reason = %reason, "file not ready, left pending");
            batch.ledger.push(
                IndexedFile::processed(path, file_type, mtime, read.checksum)
                    .with_status(FileStatus::Pending, Some(reason)),
            );
            Staged::NotReady
        }
        ReadOutcome::Invalid(reason) => {
            tracing::warn!(path = %path, reason = %reason, "skipping malformed file");
            batch.ledger.push(
                IndexedFile::processed(path, file_type, mtime, read.checksum)
                    .with_status(FileStatus::Failed, Some(reason)),
            );
            Staged::Invalid
        }
        ReadOutcome::Missing => {
            tracing::debug!(path = %path, "file vanished before read");
            Staged::Missing
        }
    }
}
