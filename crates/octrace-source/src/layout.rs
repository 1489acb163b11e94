use octrace_types::FileType;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::{Error, Result};

/// A source file found on disk, with the mtime observed when it was listed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_type: FileType,
    /// Float epoch seconds.
    pub mtime: f64,
}

impl SourceFile {
    /// Ledger key for this file.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Layout of an opencode storage tree:
///
/// ```text
/// <root>/session/<project>/<session_id>.json
/// <root>/message/<session_id>/<message_id>.json
/// <root>/part/<message_id>/<part_id>.json
/// ```
///
/// Nesting below the type directory is not significant; every `.json` file
/// under `<root>/<type>/` is a record of that type.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // Notification backends report canonical paths; keys must agree with them.
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn type_dir(&self, file_type: FileType) -> PathBuf {
        self.root.join(file_type.dir_name())
    }

    pub fn ensure_exists(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::RootNotFound(self.root.display().to_string()))
        }
    }

    /// Decide the record type of `path`, or `None` if it is not a record file
    /// of this tree.
    pub fn classify(&self, path: &Path) -> Option<FileType> {
        if path.extension().is_none_or(|ext| ext != "json") {
            return None;
        }

        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let first = match components.next()? {
            Component::Normal(name) => name.to_str()?,
            _ => return None,
        };

        // A bare file directly under the type directory still needs a name.
        components.next()?;

        first.parse::<FileType>().ok()
    }

    /// List every record file of one type with its current mtime.
    pub fn list(&self, file_type: FileType) -> Result<Vec<SourceFile>> {
        let dir = self.type_dir(file_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            // Files can vanish between listing and stat; they are simply not listed.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Some(mtime) = mtime_secs(&metadata) else {
                continue;
            };

            files.push(SourceFile {
                path: path.to_path_buf(),
                file_type,
                mtime,
            });
        }

        Ok(files)
    }

    /// List record files of every type.
    pub fn list_all(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for file_type in FileType::ALL {
            files.extend(self.list(file_type)?);
        }
        Ok(files)
    }
}

/// Modification time of `path` as float epoch seconds.
pub fn file_mtime(path: &Path) -> std::io::Result<f64> {
    let metadata = std::fs::metadata(path)?;
    mtime_secs(&metadata).ok_or_else(|| std::io::Error::other("mtime before epoch"))
}

fn mtime_secs(metadata: &Metadata) -> Option<f64> {
    metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}
