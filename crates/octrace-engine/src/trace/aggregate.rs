use octrace_types::{
    AgentTrace, MessageRecord, MessageRole, PartRecord, PartType, ToolStatus, TraceStatus,
};
use std::collections::{BTreeSet, HashMap};

use super::DelegationEdge;
use super::resolve::ParentLink;
use super::segments::{Segment, SessionTimeline};

type PartsByMessage<'a> = HashMap<&'a str, Vec<&'a PartRecord>>;

/// Sums over a segment's own messages.
#[derive(Debug, Default)]
struct SegmentTotals {
    tokens_in: i64,
    tokens_out: i64,
    cost: f64,
    tools_used: BTreeSet<String>,
}

fn totals(segment: &Segment<'_>, parts: &PartsByMessage<'_>) -> SegmentTotals {
    let mut totals = SegmentTotals::default();
    for message in &segment.messages {
        totals.tokens_in += message.tokens_in;
        totals.tokens_out += message.tokens_out;
        totals.cost += message.cost;

        for part in parts.get(message.id.as_str()).into_iter().flatten() {
            if part.part_type == PartType::Tool
                && let Some(name) = &part.tool_name
            {
                totals.tools_used.insert(name.clone());
            }
        }
    }
    totals
}

fn message_text(message: &MessageRecord, parts: &PartsByMessage<'_>) -> Option<String> {
    let texts: Vec<&str> = parts
        .get(message.id.as_str())
        .into_iter()
        .flatten()
        .filter(|p| p.part_type == PartType::Text)
        .filter_map(|p| p.text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

fn first_user_text(segment: &Segment<'_>, parts: &PartsByMessage<'_>) -> Option<String> {
    segment
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .find_map(|m| message_text(m, parts))
}

fn last_assistant_text(segment: &Segment<'_>, parts: &PartsByMessage<'_>) -> Option<String> {
    segment
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::Assistant)
        .find_map(|m| message_text(m, parts))
}

/// Status from the segment's last assistant message.
fn status_from_messages(segment: &Segment<'_>) -> TraceStatus {
    match segment
        .messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
    {
        Some(m) if m.error.is_some() => TraceStatus::Error,
        Some(m) if m.completed_at.is_none() => TraceStatus::Running,
        Some(_) => TraceStatus::Completed,
        None => TraceStatus::Running,
    }
}

pub(crate) fn status_from_tool(status: Option<ToolStatus>) -> TraceStatus {
    match status {
        Some(ToolStatus::Completed) => TraceStatus::Completed,
        Some(ToolStatus::Error) => TraceStatus::Error,
        _ => TraceStatus::Running,
    }
}

fn last_activity(segment: &Segment<'_>) -> Option<i64> {
    segment
        .messages
        .iter()
        .map(|m| m.completed_at.unwrap_or(m.created_at))
        .max()
}

fn finish(trace: &mut AgentTrace, ended_at: Option<i64>) {
    if trace.status == TraceStatus::Running {
        trace.ended_at = None;
        trace.duration_ms = None;
    } else {
        trace.ended_at = ended_at.map(|e| e.max(trace.started_at));
        trace.duration_ms = trace.ended_at.map(|e| e - trace.started_at);
    }
}

/// One trace per segment of `timeline`.
///
/// With an edge, the first segment takes the edge's prompt and sub-agent type,
/// the last takes its output and tool status. All segments share the parent.
pub(crate) fn session_traces(
    timeline: &SessionTimeline<'_>,
    parts: &PartsByMessage<'_>,
    edge: Option<&DelegationEdge>,
    parent: Option<&ParentLink>,
) -> Vec<AgentTrace> {
    timeline
        .segments
        .iter()
        .map(|segment| {
            let sums = totals(segment, parts);
            let first = segment.index == 0;
            let last = timeline.is_last(segment);

            let mut trace = AgentTrace {
                trace_id: timeline.trace_id(segment),
                session_id: timeline.session_id.to_string(),
                parent_trace_id: parent.map(|p| p.trace_id.clone()),
                parent_agent: parent.and_then(|p| p.agent.clone()),
                subagent_type: segment.agent.map(str::to_string),
                prompt_input: first_user_text(segment, parts),
                prompt_output: last_assistant_text(segment, parts),
                started_at: timeline.segment_started_at(segment),
                ended_at: None,
                duration_ms: None,
                tokens_in: sums.tokens_in,
                tokens_out: sums.tokens_out,
                cost: sums.cost,
                status: status_from_messages(segment),
                tools_used: sums.tools_used,
            };

            let mut ended_at = last_activity(segment);

            if let Some(edge) = edge {
                if first {
                    if edge.prompt.is_some() {
                        trace.prompt_input = edge.prompt.clone();
                    }
                    if edge.subagent_type.is_some() {
                        trace.subagent_type = edge.subagent_type.clone();
                    }
                }
                if last {
                    if edge.output.is_some() {
                        trace.prompt_output = edge.output.clone();
                    }
                    trace.status = status_from_tool(edge.status);
                    ended_at = ended_at.max(edge.ended_at);
                }
            }

            finish(&mut trace, ended_at);
            trace
        })
        .collect()
}

/// Trace for an edge whose target session has not been ingested. It stays a
/// root until the session shows up and the normal path links it.
pub(crate) fn placeholder_trace(edge: &DelegationEdge) -> AgentTrace {
    let started_at = edge.started_at.unwrap_or(0);
    let mut trace = AgentTrace {
        trace_id: AgentTrace::segment_id(&edge.target_session, 0),
        session_id: edge.target_session.clone(),
        parent_trace_id: None,
        parent_agent: None,
        subagent_type: edge.subagent_type.clone(),
        prompt_input: edge.prompt.clone(),
        prompt_output: edge.output.clone(),
        started_at,
        ended_at: None,
        duration_ms: None,
        tokens_in: 0,
        tokens_out: 0,
        cost: 0.0,
        status: status_from_tool(edge.status),
        tools_used: BTreeSet::new(),
    };
    finish(&mut trace, edge.ended_at);
    trace
}
