// Reader for the opencode storage tree: one directory per record type,
// one JSON file per entity.

pub mod error;
pub mod io;
pub mod layout;
mod mapper;
mod schema;

pub use error::{Error, Result};
pub use io::{ReadOutcome, SourceRead, SourceRecord, parse_bytes, read_source};
pub use layout::{SourceFile, StorageLayout, file_mtime};
