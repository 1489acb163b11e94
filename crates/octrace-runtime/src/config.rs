use crate::accumulator::AccumulatorConfig;
use crate::runtime::RuntimeSettings;
use crate::{Error, Result};
use octrace_engine::{BuildOptions, ParentTieBreak};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolve the workspace data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. OCTRACE_PATH environment variable (with tilde expansion)
/// 3. XDG data directory (recommended default)
/// 4. ~/.octrace (fallback for systems without XDG)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("OCTRACE_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("octrace"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".octrace"));
    }

    Err(Error::Config(
        "Could not determine workspace path: no HOME directory or XDG data directory found"
            .to_string(),
    ))
}

/// Expand tilde (~) in paths to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_tilde(s),
        None => path.to_path_buf(),
    }
}

fn default_storage_root() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("opencode").join("storage"),
        None => PathBuf::from("~/.local/share/opencode/storage"),
    }
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_trace_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// inotify / FSEvents / ReadDirectoryChangesW
    #[default]
    Native,
    /// Periodic directory polling, for network mounts and containers
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "BatchConfig::default_max_items")]
    pub max_items: usize,
    #[serde(default = "BatchConfig::default_window_ms")]
    pub window_ms: u64,
}

impl BatchConfig {
    fn default_max_items() -> usize {
        100
    }

    fn default_window_ms() -> u64 {
        200
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: Self::default_max_items(),
            window_ms: Self::default_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub backend: WatchBackend,
    #[serde(default = "WatchConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    fn default_poll_interval_ms() -> u64 {
        500
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: WatchBackend::default(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub tie_break: ParentTieBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// opencode storage directory holding `session/`, `message/` and `part/`.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Store location; defaults to `<workspace>/octrace.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_trace_interval_secs")]
    pub trace_interval_secs: u64,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub traces: TraceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            database: None,
            reconcile_interval_secs: default_reconcile_interval_secs(),
            trace_interval_secs: default_trace_interval_secs(),
            batch: BatchConfig::default(),
            watch: WatchConfig::default(),
            traces: TraceConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.max_items == 0 {
            return Err(Error::Config("batch.max_items must be at least 1".to_string()));
        }
        if self.batch.window_ms == 0 {
            return Err(Error::Config("batch.window_ms must be at least 1".to_string()));
        }
        if self.reconcile_interval_secs == 0 || self.trace_interval_secs == 0 {
            return Err(Error::Config("intervals must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn storage_root(&self) -> PathBuf {
        expand_path(&self.storage_root)
    }

    pub fn database_path(&self, workspace: &Path) -> PathBuf {
        match &self.database {
            Some(path) => expand_path(path),
            None => workspace.join("octrace.db"),
        }
    }

    /// Everything `SyncRuntime::start` needs, with paths resolved.
    pub fn settings(&self, workspace: &Path) -> RuntimeSettings {
        RuntimeSettings {
            storage_root: self.storage_root(),
            database: self.database_path(workspace),
            batch: AccumulatorConfig {
                max_items: self.batch.max_items,
                window: Duration::from_millis(self.batch.window_ms),
            },
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            trace_interval: Duration::from_secs(self.trace_interval_secs),
            watch: self.watch,
            build: BuildOptions {
                tie_break: self.traces.tie_break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.batch.max_items, 100);
        assert_eq!(config.batch.window_ms, 200);
        assert_eq!(config.reconcile_interval_secs, 30);
        assert_eq!(config.trace_interval_secs, 60);
        assert_eq!(config.watch.backend, WatchBackend::Native);
        assert_eq!(config.watch.poll_interval_ms, 500);
        assert_eq!(config.traces.tie_break, ParentTieBreak::MostRecent);
        assert!(config.storage_root.ends_with("opencode/storage"));
    }

    #[test]
    fn test_config_round_trips_through_toml() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let config = Config {
            storage_root: PathBuf::from("/data/opencode/storage"),
            database: Some(PathBuf::from("/data/octrace.db")),
            watch: WatchConfig {
                backend: WatchBackend::Poll,
                poll_interval_ms: 250,
            },
            traces: TraceConfig {
                tie_break: ParentTieBreak::Earliest,
            },
            ..Config::default()
        };

        std::fs::write(&config_path, toml::to_string_pretty(&config).unwrap())?;

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded, config);

        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
storage_root = "/srv/storage"

[batch]
max_items = 10

[traces]
tie_break = "earliest"
"#,
        )?;

        let config = Config::load_from(&config_path)?;
        assert_eq!(config.storage_root, PathBuf::from("/srv/storage"));
        assert_eq!(config.batch.max_items, 10);
        assert_eq!(config.batch.window_ms, 200);
        assert_eq!(config.watch, WatchConfig::default());
        assert_eq!(config.traces.tie_break, ParentTieBreak::Earliest);

        Ok(())
    }

    #[test]
    fn test_unknown_backend_is_config_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[watch]\nbackend = \"carrier-pigeon\"\n")?;

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        Ok(())
    }

    #[test]
    fn test_zero_batch_size_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[batch]\nmax_items = 0\n")?;

        assert!(Config::load_from(&config_path).is_err());

        Ok(())
    }

    #[test]
    fn test_load_nonexistent_returns_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path)?;
        assert_eq!(config, Config::default());

        Ok(())
    }

    #[test]
    fn test_database_defaults_into_workspace() {
        let config = Config::default();
        let workspace = Path::new("/ws");
        assert_eq!(config.database_path(workspace), PathBuf::from("/ws/octrace.db"));

        let settings = config.settings(workspace);
        assert_eq!(settings.batch.max_items, 100);
        assert_eq!(settings.batch.window, Duration::from_millis(200));
        assert_eq!(settings.reconcile_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_workspace_path_wins() -> Result<()> {
        assert_eq!(
            resolve_workspace_path(Some("/tmp/ws"))?,
            PathBuf::from("/tmp/ws")
        );
        Ok(())
    }
}
