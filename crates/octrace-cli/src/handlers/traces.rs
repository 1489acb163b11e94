use crate::context::ExecutionContext;
use crate::handlers::print_json;
use anyhow::Result;
use octrace_types::AgentTrace;

pub fn handle(
    ctx: &ExecutionContext,
    session: Option<&str>,
    roots: bool,
    limit: Option<usize>,
) -> Result<()> {
    let db = ctx.read_db()?;

    let stored = match session {
        Some(session_id) => db.traces_for_session(session_id)?,
        None if roots => db.root_traces(limit)?,
        None => db.list_traces()?,
    };
    let mut traces: Vec<AgentTrace> = stored.into_iter().map(|s| s.trace).collect();
    if let Some(limit) = limit {
        traces.truncate(limit);
    }

    if ctx.is_json() {
        return print_json(&traces);
    }

    if traces.is_empty() {
        println!("no traces");
        return Ok(());
    }
    for trace in &traces {
        println!(
            "{:<28} {:<10} {:<28} in={:<8} out={:<8} {}",
            trace.trace_id,
            trace.status.as_str(),
            trace.parent_trace_id.as_deref().unwrap_or("-"),
            trace.tokens_in,
            trace.tokens_out,
            format_millis(trace.started_at)
        );
    }
    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
