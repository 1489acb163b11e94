//! Agent trace reconstruction.
//!
//! Raw records only carry forward references: a `task` tool part names the
//! session it spawned, the spawned session knows nothing about its invoker.
//! Building the forest therefore runs in passes:
//!
//! 1. split every session into segments by agent identity
//! 2. extract delegation edges from `task` parts
//! 3. pick one edge per target session (tie-break policy)
//! 4. emit one trace per segment, parented under the invoking segment
//! 5. break any cycles the data implies
//!
//! The result is a pure function of the input rows, so rebuilding unchanged
//! input yields the same traces and the same fingerprints.

mod aggregate;
mod edges;
mod fingerprint;
mod resolve;
mod segments;

pub use edges::DelegationEdge;
pub use fingerprint::fingerprint;

use octrace_types::{AgentTrace, MessageRecord, PartRecord, SessionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Borrowed view of the raw tables.
#[derive(Debug, Clone, Copy)]
pub struct TraceSource<'a> {
    pub sessions: &'a [SessionRecord],
    pub messages: &'a [MessageRecord],
    /// Parts of any kind; only tool and text parts are consulted.
    pub parts: &'a [PartRecord],
}

/// Which edge wins when several `task` invocations name the same child session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentTieBreak {
    /// Latest invocation that started no later than the child.
    #[default]
    MostRecent,
    /// Earliest invocation that started no later than the child.
    Earliest,
}

impl ParentTieBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentTieBreak::MostRecent => "most_recent",
            ParentTieBreak::Earliest => "earliest",
        }
    }
}

impl fmt::Display for ParentTieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParentTieBreak {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_recent" | "most-recent" => Ok(ParentTieBreak::MostRecent),
            "earliest" => Ok(ParentTieBreak::Earliest),
            other => Err(Error::UnknownTieBreak(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub tie_break: ParentTieBreak,
}

/// Inconsistency found while building. Each one is also logged at warn level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceIssue {
    /// The session holding the `task` part was never ingested.
    MissingInvoker {
        part_id: String,
        invoking_session: String,
        target_session: String,
    },
    /// The spawned session was never ingested.
    MissingTarget {
        part_id: String,
        target_session: String,
    },
    SelfDelegation {
        part_id: String,
        session_id: String,
    },
    /// Parent link removed to keep the forest acyclic.
    CycleBroken {
        trace_id: String,
        former_parent: String,
    },
}

impl fmt::Display for TraceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceIssue::MissingInvoker {
                part_id,
                invoking_session,
                target_session,
            } => write!(
                f,
                "delegation {} to {}: invoking session {} was never ingested",
                part_id, target_session, invoking_session
            ),
            TraceIssue::MissingTarget {
                part_id,
                target_session,
            } => write!(
                f,
                "delegation {}: target session {} was never ingested",
                part_id, target_session
            ),
            TraceIssue::SelfDelegation {
                part_id,
                session_id,
            } => write!(f, "delegation {}: session {} invokes itself", part_id, session_id),
            TraceIssue::CycleBroken {
                trace_id,
                former_parent,
            } => write!(
                f,
                "trace {}: parent {} dropped to break a delegation cycle",
                trace_id, former_parent
            ),
        }
    }
}

/// Output of one build.
#[derive(Debug, Clone, Default)]
pub struct TraceForest {
    /// Ordered by `(started_at, trace_id)`.
    pub traces: Vec<AgentTrace>,
    pub issues: Vec<TraceIssue>,
}

impl TraceForest {
    pub fn get(&self, trace_id: &str) -> Option<&AgentTrace> {
        self.traces.iter().find(|t| t.trace_id == trace_id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &AgentTrace> {
        self.traces.iter().filter(|t| t.is_root())
    }

    pub fn children<'s>(&'s self, trace_id: &'s str) -> impl Iterator<Item = &'s AgentTrace> {
        self.traces
            .iter()
            .filter(move |t| t.parent_trace_id.as_deref() == Some(trace_id))
    }
}

fn record_issue(issues: &mut Vec<TraceIssue>, issue: TraceIssue) {
    tracing::warn!(%issue, "trace consistency");
    issues.push(issue);
}

pub(crate) fn build(source: &TraceSource<'_>, options: &BuildOptions) -> TraceForest {
    let mut issues = Vec::new();

    let timelines = segments::build_timelines(source);

    let message_index: HashMap<&str, &MessageRecord> =
        source.messages.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut parts_by_message: HashMap<&str, Vec<&PartRecord>> = HashMap::new();
    for part in source.parts {
        parts_by_message
            .entry(part.message_id.as_str())
            .or_default()
            .push(part);
    }
    for parts in parts_by_message.values_mut() {
        parts.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let edges = edges::extract_edges(source.parts, &message_index, &mut issues);
    let chosen = resolve::choose_edges(&edges, &timelines, options.tie_break);

    let mut traces = Vec::new();

    for (session_id, timeline) in &timelines {
        let edge = chosen.get(session_id).copied();
        let parent = edge.and_then(|e| resolve::parent_of(e, &timelines, &mut issues));
        traces.extend(aggregate::session_traces(
            timeline,
            &parts_by_message,
            edge,
            parent.as_ref(),
        ));
    }

    // Edges whose child session has not been ingested yet
    let mut dangling: Vec<&DelegationEdge> = chosen
        .iter()
        .filter(|(target, _)| !timelines.contains_key(**target))
        .map(|(_, edge)| *edge)
        .collect();
    dangling.sort_by(|a, b| a.target_session.cmp(&b.target_session));

    for edge in dangling {
        record_issue(
            &mut issues,
            TraceIssue::MissingTarget {
                part_id: edge.part_id.clone(),
                target_session: edge.target_session.clone(),
            },
        );
        traces.push(aggregate::placeholder_trace(edge));
    }

    resolve::break_cycles(&mut traces, &mut issues);

    traces.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.trace_id.cmp(&b.trace_id))
    });

    tracing::debug!(
        traces = traces.len(),
        edges = edges.len(),
        issues = issues.len(),
        "trace forest built"
    );

    TraceForest { traces, issues }
}
