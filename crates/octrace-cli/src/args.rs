use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octrace")]
#[command(about = "Ingest opencode event files into SQLite and rebuild agent traces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Workspace holding octrace.db and config.toml (default: OCTRACE_PATH or the XDG data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// opencode storage directory; overrides `storage_root` from config.toml
    #[arg(long, global = true)]
    pub storage: Option<String>,

    #[arg(long, default_value = "plain", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion pipeline: bulk pass, then watch for changes
    Run {
        /// Exit once the bulk pass, a reconcile pass and a trace build are done
        #[arg(long)]
        once: bool,

        /// Use the polling watcher instead of native notifications
        #[arg(long)]
        poll: bool,
    },

    /// Show sync phase, ledger and record counts
    Status,

    /// List files that failed to parse, with reasons
    Failed {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Rebuild agent traces from the raw tables
    BuildTraces {
        /// Parent tie-break policy: most_recent or earliest
        #[arg(long)]
        tie_break: Option<String>,
    },

    /// List stored agent traces
    Traces {
        /// Only traces of this session
        #[arg(long)]
        session: Option<String>,

        /// Only root traces
        #[arg(long, conflicts_with = "session")]
        roots: bool,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}
