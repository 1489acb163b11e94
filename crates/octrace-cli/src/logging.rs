use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. Filter comes from `OCTRACE_LOG`
/// (e.g. `octrace_runtime=debug`), default `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env("OCTRACE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
