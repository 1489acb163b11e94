// Ingestion orchestration
// Bulk pass, real-time watcher and reconciler share one ledger and one writer connection

pub mod accumulator;
pub mod bulk_loader;
pub mod config;
pub mod coordinator;
mod error;
mod ingest;
pub mod ledger;
pub mod periodic;
pub mod reconciler;
pub mod runtime;
pub mod trace_job;
pub mod watcher;

pub use accumulator::{AccumulatorConfig, BatchAccumulator};
pub use bulk_loader::BulkLoader;
pub use config::{
    BatchConfig, Config, TraceConfig, WatchBackend, WatchConfig, expand_tilde,
    resolve_workspace_path,
};
pub use coordinator::{PhaseCoordinator, Recovery};
pub use error::{Error, Result};
pub use ledger::{ClaimGuard, Ledger, SharedDb, shared};
pub use periodic::Periodic;
pub use reconciler::Reconciler;
pub use runtime::{RunSummary, RuntimeSettings, SyncRuntime};
pub use trace_job::{BuildReport, TraceJob};
pub use watcher::{EventOutcome, RealtimeWatcher, WatchHandle};
