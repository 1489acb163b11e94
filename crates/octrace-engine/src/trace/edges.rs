use octrace_types::{MessageRecord, PartRecord, ToolStatus};
use serde_json::Value;
use std::collections::HashMap;

use super::{TraceIssue, record_issue};

/// One `task` tool invocation that spawned a sub-agent session.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationEdge {
    pub part_id: String,
    pub invoking_session: String,
    pub invoking_message: String,
    /// Agent identity of the message that owns the part.
    pub invoking_agent: Option<String>,
    pub target_session: String,
    pub prompt: Option<String>,
    pub subagent_type: Option<String>,
    pub output: Option<String>,
    pub status: Option<ToolStatus>,
    /// Tool start, else the owning message's creation time.
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl DelegationEdge {
    /// Ordering key for tie-breaks; unknown starts sort first.
    pub fn start_key(&self) -> i64 {
        self.started_at.unwrap_or(i64::MIN)
    }

    pub fn from_part(part: &PartRecord, message: Option<&MessageRecord>) -> Option<Self> {
        if !part.is_delegation() {
            return None;
        }
        let target_session = part.target_session_id.clone()?;

        let input = part
            .tool_input
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok());
        let input_str = |key: &str| {
            input
                .as_ref()
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            part_id: part.id.clone(),
            invoking_session: part.session_id.clone(),
            invoking_message: part.message_id.clone(),
            invoking_agent: message.and_then(|m| m.agent.clone()),
            target_session,
            prompt: input_str("prompt"),
            subagent_type: input_str("subagent_type"),
            output: part.tool_output.clone().filter(|s| !s.is_empty()),
            status: part.tool_status,
            started_at: part.started_at.or_else(|| message.map(|m| m.created_at)),
            ended_at: part.ended_at,
        })
    }
}

/// Collect delegation edges. `task` parts that have not spawned a session yet
/// are skipped; self-delegation is reported and skipped.
pub(crate) fn extract_edges(
    parts: &[PartRecord],
    messages: &HashMap<&str, &MessageRecord>,
    issues: &mut Vec<TraceIssue>,
) -> Vec<DelegationEdge> {
    let mut edges = Vec::new();

    for part in parts.iter().filter(|p| p.is_delegation()) {
        let message = messages.get(part.message_id.as_str()).copied();
        let Some(edge) = DelegationEdge::from_part(part, message) else {
            tracing::debug!(part_id = %part.id, "task part without target session yet");
            continue;
        };

        if edge.target_session == edge.invoking_session {
            record_issue(
                issues,
                TraceIssue::SelfDelegation {
                    part_id: edge.part_id,
                    session_id: edge.target_session,
                },
            );
            continue;
        }

        edges.push(edge);
    }

    edges.sort_by(|a, b| a.part_id.cmp(&b.part_id));
    edges
}
