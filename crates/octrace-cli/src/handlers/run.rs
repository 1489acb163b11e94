use crate::context::ExecutionContext;
use crate::handlers::print_json;
use anyhow::{Context, Result};
use octrace_runtime::{RunSummary, SyncRuntime, WatchBackend};
use octrace_types::IngestStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub fn handle(ctx: &ExecutionContext, once: bool, poll: bool) -> Result<()> {
    let mut settings = ctx.settings();
    if poll {
        settings.watch.backend = WatchBackend::Poll;
    }

    let mut runtime = SyncRuntime::start(settings).context("starting sync runtime")?;

    if once {
        let waited = runtime.coordinator().wait_for_bulk_complete();
        if waited.is_ok() {
            runtime.reconcile_now()?;
            runtime.drain()?;
            runtime.build_traces()?;
        }
        // A failed bulk pass surfaces from stop() with its real cause.
        let summary = runtime.stop()?;
        waited?;
        return report(ctx, &summary);
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    while running.load(Ordering::SeqCst) {
        if let Some(err) = runtime.fatal_error() {
            tracing::error!(error = %err, "sync runtime failed, shutting down");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("stopping");
    let summary = runtime.stop()?;
    report(ctx, &summary)
}

fn report(ctx: &ExecutionContext, summary: &RunSummary) -> Result<()> {
    if ctx.is_json() {
        return print_json(summary);
    }

    match &summary.bulk {
        Some(bulk) => print_stats("bulk", bulk),
        None => println!("bulk: already complete"),
    }
    print_stats("realtime", &summary.realtime);
    if let Some(build) = &summary.last_build {
        println!(
            "traces: {} total, {} created, {} updated, {} unchanged, {} issues",
            build.traces, build.created, build.updated, build.unchanged, build.issues
        );
    }
    Ok(())
}

fn print_stats(label: &str, stats: &IngestStats) {
    if stats.per_type.is_empty() {
        println!("{}: nothing ingested", label);
        return;
    }
    for (file_type, s) in &stats.per_type {
        println!(
            "{} {:<8} files={} records={} failed={} not_ready={} skipped={} ({} ms)",
            label, file_type, s.files_seen, s.records, s.failed, s.not_ready, s.skipped, s.elapsed_ms
        );
    }
}
