//! Testing infrastructure for octrace integration tests.
//!
//! - `TestStorage`: an isolated opencode storage tree plus workspace directory
//! - `fixtures`: JSON builders for session, message and part files
//! - `assertions`: ledger and trace checks against a store

pub mod assertions;
pub mod fixtures;
pub mod world;

pub use fixtures::{MessageSpec, PartSpec};
pub use world::{CliResult, TestStorage};
