use crate::context::ExecutionContext;
use crate::handlers::print_json;
use anyhow::Result;
use octrace_engine::{BuildOptions, ParentTieBreak};
use octrace_runtime::{TraceJob, shared};

pub fn handle(ctx: &ExecutionContext, tie_break: Option<&str>) -> Result<()> {
    let tie_break = match tie_break {
        Some(name) => name.parse::<ParentTieBreak>()?,
        None => ctx.config().traces.tie_break,
    };

    let job = TraceJob::new(shared(ctx.write_db()?), BuildOptions { tie_break });
    let report = job.run_once()?;

    if ctx.is_json() {
        return print_json(&report);
    }
    println!(
        "{} traces: {} created, {} updated, {} unchanged, {} issues ({} ms)",
        report.traces,
        report.created,
        report.updated,
        report.unchanged,
        report.issues,
        report.elapsed_ms
    );
    Ok(())
}
