//! `TestStorage`: declarative setup of an opencode storage tree.
//!
//! Each instance owns a temp directory holding:
//! - `storage/{session,message,part}/...` event files
//! - `.octrace/` as the workspace (database, config)

use anyhow::{Context, Result};
use assert_cmd::Command;
use filetime::FileTime;
use octrace_index::Database;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::fixtures::{MessageSpec, PartSpec, session_json};

/// Isolated storage tree plus workspace directory.
///
/// # Example
/// ```no_run
/// use octrace_testing::{MessageSpec, TestStorage};
///
/// let storage = TestStorage::new()
///     .with_session("ses_1")
///     .with_message(MessageSpec::user("msg_1", "ses_1", 1000));
///
/// let result = storage.run(&["run", "--once"]).unwrap();
/// assert!(result.success());
/// ```
pub struct TestStorage {
    temp_dir: TempDir,
    storage_root: PathBuf,
    data_dir: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStorage {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage_root = temp_dir.path().join("storage");
        let data_dir = temp_dir.path().join(".octrace");

        for dir in ["session", "message", "part"] {
            std::fs::create_dir_all(storage_root.join(dir)).expect("Failed to create storage dir");
        }
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        // Keys in the ledger are canonical paths.
        let storage_root = std::fs::canonicalize(&storage_root).expect("Failed to canonicalize");

        Self {
            temp_dir,
            storage_root,
            data_dir,
            env_vars: HashMap::new(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("octrace.db")
    }

    // Event files

    /// Write raw bytes at `rel` under the storage root.
    pub fn write_raw(&self, rel: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.storage_root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn write_json(&self, rel: &str, value: &Value) -> Result<PathBuf> {
        self.write_raw(rel, serde_json::to_string_pretty(value)?.as_bytes())
    }

    pub fn add_session(&self, id: &str, project: &str, created: i64) -> Result<PathBuf> {
        self.write_json(
            &format!("session/{}/{}.json", project, id),
            &session_json(id, project, created),
        )
    }

    pub fn add_message(&self, spec: &MessageSpec) -> Result<PathBuf> {
        self.write_json(
            &format!("message/{}/{}.json", spec.session_id, spec.id),
            &spec.to_json(),
        )
    }

    pub fn add_part(&self, spec: &PartSpec) -> Result<PathBuf> {
        self.write_json(
            &format!("part/{}/{}.json", spec.message_id, spec.id),
            &spec.to_json(),
        )
    }

    /// Session in project `proj`, created at 1000.
    pub fn with_session(self, id: &str) -> Self {
        self.add_session(id, "proj", 1000).expect("Failed to write session");
        self
    }

    pub fn with_message(self, spec: MessageSpec) -> Self {
        self.add_message(&spec).expect("Failed to write message");
        self
    }

    pub fn with_part(self, spec: PartSpec) -> Self {
        self.add_part(&spec).expect("Failed to write part");
        self
    }

    /// Pin a file's mtime to `secs` epoch seconds (millisecond precision).
    pub fn set_mtime(&self, path: &Path, secs: f64) -> Result<()> {
        let millis = (secs * 1000.0).round() as i64;
        let mtime = FileTime::from_unix_time(
            millis.div_euclid(1000),
            (millis.rem_euclid(1000) * 1_000_000) as u32,
        );
        filetime::set_file_mtime(path, mtime)
            .with_context(|| format!("setting mtime of {}", path.display()))
    }

    /// Every record file currently in the tree.
    pub fn file_count(&self) -> usize {
        fn count(dir: &Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() {
                                count(&path)
                            } else {
                                usize::from(path.extension().is_some_and(|ext| ext == "json"))
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(&self.storage_root)
    }

    // Workspace

    pub fn write_config(&self, toml: &str) -> Result<PathBuf> {
        let path = self.data_dir.join("config.toml");
        std::fs::write(&path, toml)?;
        Ok(path)
    }

    /// Read-only handle on the workspace database.
    pub fn open_db(&self) -> Result<Database> {
        Database::open_read_only(&self.db_path())
            .with_context(|| format!("opening {}", self.db_path().display()))
    }

    // CLI

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Point a CLI command at this workspace and storage tree.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.arg("--data-dir")
            .arg(&self.data_dir)
            .arg("--storage")
            .arg(&self.storage_root)
            .env("OCTRACE_LOG", "warn");

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run the `octrace` binary against this environment.
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("octrace")
            .map_err(|e| anyhow::anyhow!("Failed to find octrace binary: {}", e))?;
        self.configure_command(&mut cmd);
        cmd.args(args);

        let output = cmd.output()?;

        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
