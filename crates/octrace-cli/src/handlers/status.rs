use crate::context::ExecutionContext;
use crate::handlers::print_json;
use anyhow::Result;
use serde_json::json;

const PENDING_SHOWN: usize = 10;

pub fn handle(ctx: &ExecutionContext) -> Result<()> {
    let db = ctx.read_db()?;
    let sync = db.load_sync_state()?;
    let ledger = db.ledger_summary()?;
    let records = db.count_records()?;
    let pending = db.pending_files(Some(PENDING_SHOWN))?;

    if ctx.is_json() {
        return print_json(&json!({
            "sync": sync,
            "ledger": ledger,
            "records": records,
            "pending": pending,
        }));
    }

    match &sync {
        Some(state) => {
            println!("phase:      {}", state.phase);
            println!("cutover:    {}", format_epoch_secs(state.cutover_time));
            println!(
                "bulk files: {}/{} marked",
                state.files_marked, state.total_files_at_cutover
            );
        }
        None => println!("phase:      not started"),
    }
    println!(
        "ledger:     {} processed, {} pending, {} failed, {} skipped",
        ledger.processed, ledger.pending, ledger.failed, ledger.skipped
    );
    println!(
        "records:    {} sessions, {} messages, {} parts, {} traces",
        records.sessions, records.messages, records.parts, records.traces
    );
    // Partially written files waiting for the next event or scan
    for entry in &pending {
        println!(
            "  pending   {}\t{}",
            entry.file_path,
            entry.error.as_deref().unwrap_or("incomplete")
        );
    }
    if ledger.pending > pending.len() as i64 {
        println!("  ... {} more pending", ledger.pending - pending.len() as i64);
    }
    Ok(())
}

fn format_epoch_secs(secs: f64) -> String {
    chrono::DateTime::from_timestamp_millis((secs * 1000.0) as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
