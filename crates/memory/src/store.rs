//! Sandboxed memory store — path-addressed text files under one root.
//!
//! Agents address entries by virtual paths such as
//! `/memories/clients/acme.md`. Every path is validated before any I/O
//! happens, and every write goes through a temp file + rename so an entry
//! is never left half-written.
//!
//! Storage location: `~/.agentgate/memories/` by default.

use agentgate_config::MemoryConfig;
use agentgate_core::error::MemoryError;
use agentgate_security::{Sandbox, validate_memory_path};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a `view` returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewOutcome {
    Directory { path: String, entries: Vec<DirEntry> },
    File { path: String, content: String },
}

impl ViewOutcome {
    /// Text form handed back to agents.
    pub fn render(&self) -> String {
        match self {
            Self::File { content, .. } => content.clone(),
            Self::Directory { path, entries } => {
                let mut out = format!("Directory: {path}");
                if entries.is_empty() {
                    out.push_str("\n(empty)");
                }
                for entry in entries {
                    match entry.kind {
                        EntryKind::Directory => out.push_str(&format!("\n- {}/", entry.name)),
                        EntryKind::File => out.push_str(&format!(
                            "\n- {} ({} bytes, modified {})",
                            entry.name,
                            entry.size,
                            entry.modified.format("%Y-%m-%d %H:%M")
                        )),
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// The memory store.
///
/// Cheap to clone; clones share the same root on disk.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: PathBuf,
    marker: String,
    max_file_size: usize,
    hide_dotfiles: bool,
    enforce_scope: bool,
    scope: Option<String>,
}

impl MemoryStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, marker: impl Into<String>) -> Result<Self, MemoryError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(io_err)?;
        debug!(root = %root.display(), "Memory store opened");
        Ok(Self {
            root,
            marker: marker.into(),
            max_file_size: 1024 * 1024,
            hide_dotfiles: true,
            enforce_scope: false,
            scope: None,
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Result<Self, MemoryError> {
        Ok(Self::new(&config.root_dir, &config.root_marker)?
            .with_max_file_size(config.max_file_size)
            .with_hidden_dotfiles(config.hide_dotfiles)
            .with_agent_scope(config.enforce_agent_scope))
    }

    pub fn with_max_file_size(mut self, max: usize) -> Self {
        self.max_file_size = max;
        self
    }

    pub fn with_hidden_dotfiles(mut self, hide: bool) -> Self {
        self.hide_dotfiles = hide;
        self
    }

    /// Make [`MemoryStore::for_agent`] restrict agents to their own category.
    pub fn with_agent_scope(mut self, enforce: bool) -> Self {
        self.enforce_scope = enforce;
        self
    }

    /// The store as `agent_id` sees it: scoped when scoping is enforced,
    /// the shared tree otherwise.
    pub fn for_agent(&self, agent_id: &str) -> Self {
        if self.enforce_scope {
            self.scoped(agent_id)
        } else {
            self.clone()
        }
    }

    /// A view of this store restricted to `<marker>/<agent_id>/`.
    pub fn scoped(&self, agent_id: &str) -> Self {
        Self {
            scope: Some(agent_id.to_string()),
            ..self.clone()
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// View a directory listing or a file's content.
    ///
    /// `range` is a 1-indexed inclusive line range and only applies to files.
    pub async fn view(&self, path: &str, range: Option<(usize, usize)>) -> Result<ViewOutcome, MemoryError> {
        let resolved = self.resolve(path)?;
        let meta = metadata(&resolved, path).await?;

        if meta.is_dir() {
            let entries = self.list_dir(&resolved).await?;
            debug!(path, count = entries.len(), "Memory directory viewed");
            return Ok(ViewOutcome::Directory {
                path: path.to_string(),
                entries,
            });
        }

        let content = tokio::fs::read_to_string(&resolved).await.map_err(io_err)?;
        let content = match range {
            None => content,
            Some((start, end)) => {
                let lines: Vec<&str> = content.lines().collect();
                let total = lines.len();
                if start == 0 || end < start || end > total {
                    return Err(MemoryError::InvalidRange { start, end, total });
                }
                lines[start - 1..end].join("\n")
            }
        };

        Ok(ViewOutcome::File {
            path: path.to_string(),
            content,
        })
    }

    /// Create a new file. Fails if anything already exists at `path`.
    pub async fn create(&self, path: &str, content: &str) -> Result<(), MemoryError> {
        let resolved = self.resolve(path)?;
        if exists(&resolved).await {
            return Err(MemoryError::AlreadyExists(path.to_string()));
        }
        self.check_size(path, content)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        write_atomic(&resolved, content).await?;

        info!(path, bytes = content.len(), "Memory file created");
        Ok(())
    }

    /// Replace the single exact occurrence of `old` with `new`.
    pub async fn str_replace(&self, path: &str, old: &str, new: &str) -> Result<(), MemoryError> {
        let (resolved, content) = self.read_file(path).await?;

        let count = if old.is_empty() { 0 } else { content.matches(old).count() };
        match count {
            0 => return Err(MemoryError::TextNotFound(path.to_string())),
            1 => {}
            count => {
                return Err(MemoryError::AmbiguousMatch {
                    path: path.to_string(),
                    count,
                });
            }
        }

        let updated = content.replacen(old, new, 1);
        self.check_size(path, &updated)?;
        write_atomic(&resolved, &updated).await?;

        debug!(path, "Memory file text replaced");
        Ok(())
    }

    /// Insert `text` so that it becomes line `line` (1-indexed).
    pub async fn insert(&self, path: &str, line: usize, text: &str) -> Result<(), MemoryError> {
        let (resolved, content) = self.read_file(path).await?;

        let mut lines: Vec<&str> = content.lines().collect();
        let max = lines.len() + 1;
        if line == 0 || line > max {
            return Err(MemoryError::InvalidLine { line, max });
        }
        lines.insert(line - 1, text);

        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }
        self.check_size(path, &updated)?;
        write_atomic(&resolved, &updated).await?;

        debug!(path, line, "Memory file text inserted");
        Ok(())
    }

    /// Delete a file or a directory tree. The root itself cannot be deleted.
    pub async fn delete(&self, path: &str) -> Result<(), MemoryError> {
        let resolved = self.resolve(path)?;
        self.reject_root(path, &resolved)?;

        let meta = metadata(&resolved, path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&resolved).await.map_err(io_err)?;
        } else {
            tokio::fs::remove_file(&resolved).await.map_err(io_err)?;
        }

        info!(path, "Memory entry deleted");
        Ok(())
    }

    /// Move an entry. The source must exist and the destination must not.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), MemoryError> {
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        self.reject_root(old_path, &from)?;
        self.reject_root(new_path, &to)?;

        if !exists(&from).await {
            return Err(MemoryError::NotFound(old_path.to_string()));
        }
        if exists(&to).await {
            return Err(MemoryError::AlreadyExists(new_path.to_string()));
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::rename(&from, &to).await.map_err(io_err)?;

        info!(from = old_path, to = new_path, "Memory entry renamed");
        Ok(())
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, MemoryError> {
        let sandbox = Sandbox {
            marker: &self.marker,
            root: &self.root,
            scope: self.scope.as_deref(),
        };
        validate_memory_path(path, &sandbox).map_err(|e| {
            warn!(path = %path.escape_debug(), error = %e, "Memory path rejected");
            MemoryError::PathRejected {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn reject_root(&self, path: &str, resolved: &Path) -> Result<(), MemoryError> {
        let is_root = self
            .root
            .canonicalize()
            .map(|root| root == resolved)
            .unwrap_or(false);
        if is_root {
            return Err(MemoryError::PathRejected {
                path: path.to_string(),
                reason: "the memory root itself cannot be modified".into(),
            });
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<(PathBuf, String), MemoryError> {
        let resolved = self.resolve(path)?;
        let meta = metadata(&resolved, path).await?;
        if !meta.is_file() {
            return Err(MemoryError::NotAFile(path.to_string()));
        }
        let content = tokio::fs::read_to_string(&resolved).await.map_err(io_err)?;
        Ok((resolved, content))
    }

    fn check_size(&self, path: &str, content: &str) -> Result<(), MemoryError> {
        if content.len() > self.max_file_size {
            return Err(MemoryError::SizeExceeded {
                path: path.to_string(),
                size: content.len(),
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, MemoryError> {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(dir).await.map_err(io_err)?;

        while let Some(entry) = reader.next_entry().await.map_err(io_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.hide_dotfiles && name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(name, error = %e, "Skipping unreadable memory entry");
                    continue;
                }
            };
            entries.push(DirEntry {
                name,
                kind: if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn io_err(e: std::io::Error) -> MemoryError {
    MemoryError::Io(e.to_string())
}

async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

async fn metadata(resolved: &Path, path: &str) -> Result<std::fs::Metadata, MemoryError> {
    match tokio::fs::metadata(resolved).await {
        Ok(meta) => Ok(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MemoryError::NotFound(path.to_string()))
        }
        Err(e) => Err(io_err(e)),
    }
}

/// Write through a sibling temp file so readers never see partial content.
async fn write_atomic(target: &Path, content: &str) -> Result<(), MemoryError> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, content).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}
