use octrace_engine::{BuildOptions, TraceSource, build_fingerprinted};
use serde::Serialize;
use std::time::Instant;

use crate::Result;
use crate::ledger::{SharedDb, lock};

/// Outcome of one trace rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub traces: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Consistency problems found in the raw data (dangling edges, cycles).
    pub issues: usize,
    pub elapsed_ms: u64,
}

impl BuildReport {
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}

/// Rebuilds the trace table from the raw tables, writing only traces whose
/// fingerprint changed.
#[derive(Clone)]
pub struct TraceJob {
    db: SharedDb,
    options: BuildOptions,
}

impl TraceJob {
    pub fn new(db: SharedDb, options: BuildOptions) -> Self {
        Self { db, options }
    }

    pub fn run_once(&self) -> Result<BuildReport> {
        let started = Instant::now();

        // Read under the lock, build without it so ingestion keeps flowing.
        let (inputs, existing) = {
            let db = lock(&self.db)?;
            (db.load_trace_inputs()?, db.trace_fingerprints()?)
        };

        let source = TraceSource {
            sessions: &inputs.sessions,
            messages: &inputs.messages,
            parts: &inputs.parts,
        };
        let (traces, issues) = build_fingerprinted(&source, &self.options);

        let mut report = BuildReport {
            traces: traces.len(),
            issues: issues.len(),
            ..BuildReport::default()
        };

        let mut changed = Vec::new();
        for (trace, fp) in traces {
            match existing.get(&trace.trace_id) {
                None => report.created += 1,
                Some(old) if *old != fp => report.updated += 1,
                Some(_) => {
                    report.unchanged += 1;
                    continue;
                }
            }
            changed.push((trace, fp));
        }

        if !changed.is_empty() {
            lock(&self.db)?.upsert_traces(&changed)?;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            traces = report.traces,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            issues = report.issues,
            elapsed_ms = report.elapsed_ms,
            "trace build finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::shared;
    use octrace_index::{Database, IngestBatch};
    use octrace_types::{MessageRecord, MessageRole, SessionRecord};

    fn session(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            project_id: None,
            parent_id: None,
            title: None,
            directory: None,
            created_at: 1000,
            updated_at: None,
            source_path: format!("/s/session/p/{}.json", id),
        }
    }

    fn message(id: &str, session_id: &str, created_at: i64, tokens_in: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            session_id: session_id.to_string(),
            role: MessageRole::Assistant,
            agent: Some("build".to_string()),
            model_id: None,
            provider_id: None,
            created_at,
            completed_at: Some(created_at + 10),
            tokens_in,
            tokens_out: 1,
            tokens_reasoning: 0,
            cache_read: 0,
            cache_write: 0,
            cost: 0.0,
            error: None,
            source_path: format!("/s/message/{}/{}.json", session_id, id),
        }
    }

    fn commit(db: &SharedDb, batch: IngestBatch) {
        lock(db).unwrap().commit_batch(&batch).unwrap();
    }

    #[test]
    fn test_rebuild_writes_only_changed_traces() {
        let db = shared(Database::open_in_memory().unwrap());
        commit(
            &db,
            IngestBatch {
                sessions: vec![session("ses_a"), session("ses_b")],
                messages: vec![
                    message("msg_a1", "ses_a", 1000, 5),
                    message("msg_b1", "ses_b", 1000, 7),
                ],
                ..IngestBatch::default()
            },
        );

        let job = TraceJob::new(db.clone(), BuildOptions::default());
        let first = job.run_once().unwrap();
        assert_eq!((first.created, first.updated, first.unchanged), (2, 0, 0));

        let second = job.run_once().unwrap();
        assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 2));
        assert_eq!(second.written(), 0);

        commit(
            &db,
            IngestBatch {
                messages: vec![message("msg_a2", "ses_a", 2000, 20)],
                ..IngestBatch::default()
            },
        );
        let third = job.run_once().unwrap();
        assert_eq!((third.created, third.updated, third.unchanged), (0, 1, 1));

        let stored = lock(&db).unwrap().get_trace("ses_a").unwrap().unwrap();
        assert_eq!(stored.trace.tokens_in, 25);
    }
}
