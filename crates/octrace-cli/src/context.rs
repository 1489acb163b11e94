use crate::args::{Cli, OutputFormat};
use anyhow::{Context, Result, bail};
use octrace_index::Database;
use octrace_runtime::{Config, RuntimeSettings, expand_tilde, resolve_workspace_path};
use std::path::{Path, PathBuf};

/// Workspace, config and output settings resolved once per invocation.
pub struct ExecutionContext {
    data_dir: PathBuf,
    config: Config,
    pub format: OutputFormat,
}

impl ExecutionContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let data_dir = resolve_workspace_path(cli.data_dir.as_deref())?;
        let config_path = data_dir.join("config.toml");
        let mut config = Config::load_from(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;

        if let Some(storage) = &cli.storage {
            config.storage_root = expand_tilde(storage);
        }

        Ok(Self {
            data_dir,
            config,
            format: cli.format,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.database_path(&self.data_dir)
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.config.settings(&self.data_dir)
    }

    /// Read-only handle; never creates or migrates the store.
    pub fn read_db(&self) -> Result<Database> {
        let path = self.db_path();
        if !path.exists() {
            bail!(
                "no database at {}; run `octrace run` first",
                path.display()
            );
        }
        Database::open_read_only(&path).with_context(|| format!("opening {}", path.display()))
    }

    pub fn write_db(&self) -> Result<Database> {
        let path = self.db_path();
        Database::open(&path).with_context(|| format!("opening {}", path.display()))
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
