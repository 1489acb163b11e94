use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Separator between a session id and its segment number in a trace id.
pub const SEGMENT_SEPARATOR: &str = ":seg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Completed,
    Error,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Running => "running",
            TraceStatus::Completed => "completed",
            TraceStatus::Error => "error",
        }
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TraceStatus::Running),
            "completed" => Ok(TraceStatus::Completed),
            "error" => Ok(TraceStatus::Error),
            other => Err(Error::unknown("trace status", other)),
        }
    }
}

/// One agent execution: a root (user-initiated) session segment or a
/// delegated sub-agent run.
///
/// `parent_trace_id` links traces into a forest. Token fields are sums over
/// the trace's own messages only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTrace {
    pub trace_id: String,
    pub session_id: String,
    pub parent_trace_id: Option<String>,
    pub parent_agent: Option<String>,
    pub subagent_type: Option<String>,
    pub prompt_input: Option<String>,
    pub prompt_output: Option<String>,
    /// Epoch milliseconds.
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub status: TraceStatus,
    pub tools_used: BTreeSet<String>,
}

impl AgentTrace {
    pub fn is_root(&self) -> bool {
        self.parent_trace_id.is_none()
    }

    /// Trace id for segment `index` of `session_id`. Segment 0 is the session id itself.
    pub fn segment_id(session_id: &str, index: usize) -> String {
        if index == 0 {
            session_id.to_string()
        } else {
            format!("{}{}{}", session_id, SEGMENT_SEPARATOR, index)
        }
    }
}
