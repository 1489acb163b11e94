use crate::context::ExecutionContext;
use crate::handlers::print_json;
use anyhow::Result;

pub fn handle(ctx: &ExecutionContext, limit: usize) -> Result<()> {
    let db = ctx.read_db()?;
    let failed = db.failed_files(Some(limit))?;

    if ctx.is_json() {
        return print_json(&failed);
    }

    if failed.is_empty() {
        println!("no failed files");
        return Ok(());
    }
    for entry in &failed {
        println!(
            "{}\t{}",
            entry.file_path,
            entry.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
