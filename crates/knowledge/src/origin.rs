//! Filesystem origin store — one folder per namespace.
//!
//! Layout: `<root>/<namespace>/**/<file>`. Filenames are reported relative
//! to the namespace folder with `/` separators. Hidden files and folders
//! are ignored.

use agentgate_core::error::KnowledgeError;
use agentgate_core::{OriginFile, OriginStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::extract::mime_from_filename;

pub struct FsOriginStore {
    root: PathBuf,
}

impl FsOriginStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl OriginStore for FsOriginStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn fetch_namespace(&self, namespace: &str) -> Result<Vec<OriginFile>, KnowledgeError> {
        let fail = |reason: String| KnowledgeError::OriginFetchFailed {
            namespace: namespace.to_string(),
            reason,
        };

        if namespace.is_empty()
            || namespace.starts_with('.')
            || namespace.contains(['/', '\\', '\0'])
        {
            return Err(fail("invalid namespace name".into()));
        }

        let dir = self.root.join(namespace);
        if !dir.is_dir() {
            return Err(fail(format!("folder not found: {}", dir.display())));
        }

        // walkdir is blocking; keep it off the async workers.
        let files = tokio::task::spawn_blocking(move || read_folder(&dir))
            .await
            .map_err(|e| fail(format!("walk task failed: {e}")))?
            .map_err(fail)?;

        debug!(namespace, count = files.len(), "Fetched namespace from filesystem origin");
        Ok(files)
    }
}

fn read_folder(dir: &Path) -> Result<Vec<OriginFile>, String> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| format!("failed to walk directory: {e}"))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let filename = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content =
            std::fs::read(path).map_err(|e| format!("failed to read {filename}: {e}"))?;
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        files.push(OriginFile {
            mime_type: mime_from_filename(&filename).to_string(),
            filename,
            content,
            modified,
        });
    }

    Ok(files)
}
