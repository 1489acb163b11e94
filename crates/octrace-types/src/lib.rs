pub mod error;
pub mod ledger;
pub mod records;
pub mod stats;
pub mod sync;
pub mod trace;

pub use error::{Error, Result};
pub use ledger::*;
pub use records::*;
pub use stats::*;
pub use sync::*;
pub use trace::*;
