use octrace_types::AgentTrace;
use std::collections::{BTreeMap, HashMap};

use super::segments::SessionTimeline;
use super::{DelegationEdge, ParentTieBreak, TraceIssue, record_issue};

/// Resolved parent of a delegated trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentLink {
    pub trace_id: String,
    pub agent: Option<String>,
}

/// Pick one edge per target session.
///
/// Candidates that started no later than the child are preferred; if none did
/// (clock skew, or the child has not been ingested), all candidates compete.
pub(crate) fn choose_edges<'e>(
    edges: &'e [DelegationEdge],
    timelines: &BTreeMap<&str, SessionTimeline<'_>>,
    tie_break: ParentTieBreak,
) -> HashMap<&'e str, &'e DelegationEdge> {
    let mut by_target: HashMap<&'e str, Vec<&'e DelegationEdge>> = HashMap::new();
    for edge in edges {
        by_target
            .entry(edge.target_session.as_str())
            .or_default()
            .push(edge);
    }

    by_target
        .into_iter()
        .filter_map(|(target, candidates)| {
            let child_start = timelines.get(target).map(SessionTimeline::started_at);

            let eligible: Vec<&DelegationEdge> = match child_start {
                Some(start) => candidates
                    .iter()
                    .copied()
                    .filter(|e| e.start_key() <= start)
                    .collect(),
                None => Vec::new(),
            };
            let pool = if eligible.is_empty() {
                &candidates
            } else {
                &eligible
            };

            if pool.len() > 1 {
                tracing::debug!(
                    target_session = target,
                    candidates = pool.len(),
                    policy = %tie_break,
                    "multiple delegation edges for one session"
                );
            }

            pick(pool, tie_break).map(|edge| (target, edge))
        })
        .collect()
}

fn pick<'e>(pool: &[&'e DelegationEdge], tie_break: ParentTieBreak) -> Option<&'e DelegationEdge> {
    match tie_break {
        // Equal starts: smaller part id wins under both policies
        ParentTieBreak::MostRecent => pool.iter().copied().max_by(|a, b| {
            a.start_key()
                .cmp(&b.start_key())
                .then_with(|| b.part_id.cmp(&a.part_id))
        }),
        ParentTieBreak::Earliest => pool.iter().copied().min_by(|a, b| {
            a.start_key()
                .cmp(&b.start_key())
                .then_with(|| a.part_id.cmp(&b.part_id))
        }),
    }
}

/// The segment trace of the invoking session that holds the invoking message.
pub(crate) fn parent_of(
    edge: &DelegationEdge,
    timelines: &BTreeMap<&str, SessionTimeline<'_>>,
    issues: &mut Vec<TraceIssue>,
) -> Option<ParentLink> {
    let Some(timeline) = timelines.get(edge.invoking_session.as_str()) else {
        record_issue(
            issues,
            TraceIssue::MissingInvoker {
                part_id: edge.part_id.clone(),
                invoking_session: edge.invoking_session.clone(),
                target_session: edge.target_session.clone(),
            },
        );
        return None;
    };

    let segment = timeline.locate(&edge.invoking_message, edge.started_at);
    Some(ParentLink {
        trace_id: timeline.trace_id(segment),
        agent: edge
            .invoking_agent
            .clone()
            .or_else(|| segment.agent.map(str::to_string)),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    OnPath,
    Done,
}

/// Trace indices forming one parent cycle, if any exists.
fn find_cycle(traces: &[AgentTrace]) -> Option<Vec<usize>> {
    let index: HashMap<&str, usize> = traces
        .iter()
        .enumerate()
        .map(|(i, t)| (t.trace_id.as_str(), i))
        .collect();
    let mut marks = vec![Mark::New; traces.len()];

    for start in 0..traces.len() {
        if marks[start] != Mark::New {
            continue;
        }

        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match marks[i] {
                Mark::Done => break,
                Mark::OnPath => {
                    let from = path.iter().position(|&p| p == i).unwrap_or(0);
                    return Some(path[from..].to_vec());
                }
                Mark::New => {
                    marks[i] = Mark::OnPath;
                    path.push(i);
                    current = traces[i]
                        .parent_trace_id
                        .as_deref()
                        .and_then(|p| index.get(p).copied());
                }
            }
        }

        for i in path {
            marks[i] = Mark::Done;
        }
    }

    None
}

/// Null the parent of the latest-started trace in each cycle until none remain.
pub(crate) fn break_cycles(traces: &mut [AgentTrace], issues: &mut Vec<TraceIssue>) {
    while let Some(cycle) = find_cycle(traces) {
        let Some(victim) = cycle.into_iter().max_by(|&a, &b| {
            traces[a]
                .started_at
                .cmp(&traces[b].started_at)
                .then_with(|| traces[a].trace_id.cmp(&traces[b].trace_id))
        }) else {
            break;
        };

        let trace = &mut traces[victim];
        let former_parent = trace.parent_trace_id.take().unwrap_or_default();
        trace.parent_agent = None;
        record_issue(
            issues,
            TraceIssue::CycleBroken {
                trace_id: trace.trace_id.clone(),
                former_parent,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octrace_types::TraceStatus;
    use std::collections::BTreeSet;

    fn edge(part_id: &str, target: &str, start: i64) -> DelegationEdge {
        DelegationEdge {
            part_id: part_id.to_string(),
            invoking_session: "ses_parent".to_string(),
            invoking_message: "msg".to_string(),
            invoking_agent: Some("build".to_string()),
            target_session: target.to_string(),
            prompt: None,
            subagent_type: None,
            output: None,
            status: None,
            started_at: Some(start),
            ended_at: None,
        }
    }

    fn trace(id: &str, parent: Option<&str>, started_at: i64) -> AgentTrace {
        AgentTrace {
            trace_id: id.to_string(),
            session_id: id.to_string(),
            parent_trace_id: parent.map(str::to_string),
            parent_agent: parent.map(|_| "build".to_string()),
            subagent_type: None,
            prompt_input: None,
            prompt_output: None,
            started_at,
            ended_at: None,
            duration_ms: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            status: TraceStatus::Running,
            tools_used: BTreeSet::new(),
        }
    }

    #[test]
    fn test_pick_most_recent_and_earliest() {
        let a = edge("p_a", "child", 10);
        let b = edge("p_b", "child", 30);
        let c = edge("p_c", "child", 20);
        let pool = vec![&a, &b, &c];

        assert_eq!(pick(&pool, ParentTieBreak::MostRecent).unwrap().part_id, "p_b");
        assert_eq!(pick(&pool, ParentTieBreak::Earliest).unwrap().part_id, "p_a");
    }

    #[test]
    fn test_equal_starts_prefer_smaller_part_id() {
        let a = edge("p_2", "child", 10);
        let b = edge("p_1", "child", 10);
        let pool = vec![&a, &b];

        assert_eq!(pick(&pool, ParentTieBreak::MostRecent).unwrap().part_id, "p_1");
        assert_eq!(pick(&pool, ParentTieBreak::Earliest).unwrap().part_id, "p_1");
    }

    #[test]
    fn test_choose_without_child_timeline_uses_all_candidates() {
        let edges = vec![edge("p_a", "child", 10), edge("p_b", "child", 20)];
        let chosen = choose_edges(&edges, &BTreeMap::new(), ParentTieBreak::MostRecent);
        assert_eq!(chosen["child"].part_id, "p_b");
    }

    #[test]
    fn test_break_two_cycle_drops_latest_started() {
        let mut traces = vec![trace("a", Some("b"), 10), trace("b", Some("a"), 20)];
        let mut issues = Vec::new();

        break_cycles(&mut traces, &mut issues);

        assert_eq!(traces[0].parent_trace_id.as_deref(), Some("b"));
        assert_eq!(traces[1].parent_trace_id, None);
        assert_eq!(
            issues,
            vec![TraceIssue::CycleBroken {
                trace_id: "b".to_string(),
                former_parent: "a".to_string(),
            }]
        );
    }

    #[test]
    fn test_acyclic_chain_untouched() {
        let mut traces = vec![
            trace("root", None, 1),
            trace("mid", Some("root"), 2),
            trace("leaf", Some("mid"), 3),
            trace("orphan", Some("missing"), 4),
        ];
        let before = traces.clone();
        let mut issues = Vec::new();

        break_cycles(&mut traces, &mut issues);

        assert_eq!(traces, before);
        assert!(issues.is_empty());
    }
}
