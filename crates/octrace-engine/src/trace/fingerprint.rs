use octrace_types::AgentTrace;
use sha2::{Digest, Sha256};

const FIELD_SEP: u8 = 0x1f;
const NONE: &[u8] = &[0x00];

/// SHA-256 hex over every field of the trace.
///
/// Two traces share a fingerprint iff they would be stored identically, which
/// lets the trace job skip rows whose inputs did not change.
pub fn fingerprint(trace: &AgentTrace) -> String {
    let mut hasher = Sha256::new();

    let mut text = |value: Option<&str>| {
        hasher.update(value.map(str::as_bytes).unwrap_or(NONE));
        hasher.update([FIELD_SEP]);
    };
    text(Some(&trace.trace_id));
    text(Some(&trace.session_id));
    text(trace.parent_trace_id.as_deref());
    text(trace.parent_agent.as_deref());
    text(trace.subagent_type.as_deref());
    text(trace.prompt_input.as_deref());
    text(trace.prompt_output.as_deref());
    text(Some(trace.status.as_str()));
    for tool in &trace.tools_used {
        text(Some(tool));
    }

    for value in [
        Some(trace.started_at),
        trace.ended_at,
        trace.duration_ms,
        Some(trace.tokens_in),
        Some(trace.tokens_out),
    ] {
        match value {
            Some(v) => hasher.update(v.to_le_bytes()),
            None => hasher.update(NONE),
        }
        hasher.update([FIELD_SEP]);
    }
    hasher.update(trace.cost.to_bits().to_le_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use octrace_types::TraceStatus;
    use std::collections::BTreeSet;

    fn sample() -> AgentTrace {
        AgentTrace {
            trace_id: "ses_1".to_string(),
            session_id: "ses_1".to_string(),
            parent_trace_id: None,
            parent_agent: None,
            subagent_type: Some("build".to_string()),
            prompt_input: Some("hi".to_string()),
            prompt_output: None,
            started_at: 1,
            ended_at: None,
            duration_ms: None,
            tokens_in: 10,
            tokens_out: 20,
            cost: 0.5,
            status: TraceStatus::Running,
            tools_used: BTreeSet::from(["bash".to_string()]),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = sample();
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_eq!(fingerprint(&a).len(), 64);

        let mut b = sample();
        b.tokens_out = 21;
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let mut c = sample();
        c.prompt_output = Some(String::new());
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }
}
