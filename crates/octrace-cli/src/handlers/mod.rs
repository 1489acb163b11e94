pub mod build_traces;
pub mod failed;
pub mod run;
pub mod status;
pub mod traces;

use anyhow::Result;
use serde::Serialize;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
