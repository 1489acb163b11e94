// Engine module - trace reconstruction
// Pure functions over raw records; no I/O, no store access

mod error;
pub mod trace;

pub use error::{Error, Result};
pub use trace::{
    BuildOptions, DelegationEdge, ParentTieBreak, TraceForest, TraceIssue, TraceSource,
    fingerprint,
};

use octrace_types::AgentTrace;

// Façade API - runtime and CLI call these instead of reaching into submodules

/// Rebuild the complete trace forest from raw records.
pub fn build_traces(source: &TraceSource<'_>, options: &BuildOptions) -> TraceForest {
    trace::build(source, options)
}

/// Build and pair every trace with its content fingerprint.
pub fn build_fingerprinted(
    source: &TraceSource<'_>,
    options: &BuildOptions,
) -> (Vec<(AgentTrace, String)>, Vec<TraceIssue>) {
    let forest = trace::build(source, options);
    let traces = forest
        .traces
        .into_iter()
        .map(|t| {
            let fp = fingerprint(&t);
            (t, fp)
        })
        .collect();
    (traces, forest.issues)
}
