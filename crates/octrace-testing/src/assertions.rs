//! Store-level assertions shared by integration tests.

use anyhow::{Context, Result, bail};
use octrace_index::Database;
use octrace_types::{AgentTrace, FileStatus};
use std::collections::HashMap;
use std::path::Path;

/// Assert the ledger holds `path` with `status`.
pub fn assert_ledger_status(db: &Database, path: &Path, status: FileStatus) -> Result<()> {
    let key = path.to_string_lossy();
    let entry = db
        .get_indexed_file(&key)?
        .with_context(|| format!("{} missing from ledger", key))?;

    if entry.status != status {
        bail!(
            "{} is {} in the ledger, expected {}",
            key,
            entry.status.as_str(),
            status.as_str()
        );
    }
    Ok(())
}

/// Assert every `parent_trace_id` chain ends at a root, and return the
/// deepest chain length.
pub fn assert_acyclic(traces: &[AgentTrace]) -> Result<usize> {
    let parents: HashMap<&str, Option<&str>> = traces
        .iter()
        .map(|t| (t.trace_id.as_str(), t.parent_trace_id.as_deref()))
        .collect();

    let mut deepest = 0;
    for trace in traces {
        let mut hops = 0;
        let mut current = trace.parent_trace_id.as_deref();
        while let Some(id) = current {
            hops += 1;
            if hops > traces.len() {
                bail!("cycle through {}", trace.trace_id);
            }
            current = parents
                .get(id)
                .with_context(|| format!("{} points at unknown parent {}", trace.trace_id, id))?
                .as_deref();
        }
        deepest = deepest.max(hops);
    }
    Ok(deepest)
}

/// Assert every child of a completed parent started inside the parent's
/// `[started_at, ended_at]` window. Returns how many pairs were checked.
pub fn assert_nested_in_time(traces: &[AgentTrace]) -> Result<usize> {
    let by_id: HashMap<&str, &AgentTrace> =
        traces.iter().map(|t| (t.trace_id.as_str(), t)).collect();

    let mut checked = 0;
    for child in traces {
        let Some(parent_id) = child.parent_trace_id.as_deref() else {
            continue;
        };
        let parent = by_id
            .get(parent_id)
            .with_context(|| format!("{} points at unknown parent {}", child.trace_id, parent_id))?;
        let Some(parent_end) = parent.ended_at else {
            continue;
        };

        if child.started_at < parent.started_at || child.started_at > parent_end {
            bail!(
                "{} started at {} outside parent {} window [{}, {}]",
                child.trace_id,
                child.started_at,
                parent.trace_id,
                parent.started_at,
                parent_end
            );
        }
        checked += 1;
    }
    Ok(checked)
}
