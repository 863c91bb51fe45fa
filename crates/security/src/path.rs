//! Path validation — sandboxing memory paths to a single root.
//!
//! Memory paths are virtual (`/memories/notes/a.md`). A path is accepted
//! only if it starts with the root marker, is free of shell metacharacters,
//! NUL bytes and traversal segments, and resolves to a location inside the
//! canonical sandbox directory, with symlinks taken into account.

use std::path::{Component, Path, PathBuf};

/// Characters that never appear in a valid memory path.
const FORBIDDEN_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']', '*', '?', '!', '~', '\'',
    '"', '\\', ':', '\n', '\r', '\t',
];

/// Percent-encoded forms of `.`, `/` and `\`.
const ENCODED_TRAVERSAL: &[&str] = &["%2e", "%2f", "%5c"];

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' must start with '{marker}'")]
    MissingRootMarker { path: String, marker: String },

    #[error("Path contains a NUL byte")]
    NullByte,

    #[error("Path '{path}' contains forbidden character {ch:?}")]
    ForbiddenCharacter { path: String, ch: char },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' resolves outside the sandbox root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' is outside the '{scope}' sub-root")]
    OutsideScope { path: String, scope: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// The sandbox a memory path is resolved against.
#[derive(Debug, Clone)]
pub struct Sandbox<'a> {
    /// Virtual prefix, e.g. `/memories`.
    pub marker: &'a str,
    /// Directory the marker maps to. Must exist.
    pub root: &'a Path,
    /// Optional first path segment every path must live under.
    pub scope: Option<&'a str>,
}

/// Validate a virtual memory path and resolve it to a filesystem location.
///
/// Checks, in order:
/// 1. No NUL bytes, shell metacharacters or percent-encoded separators
/// 2. Path starts with the root marker
/// 3. No `.` or `..` segments
/// 4. Path is under the agent scope (if one is set)
/// 5. The deepest existing ancestor, canonicalized, is inside the root
///
/// Performs no writes. Returns the resolved location on success.
pub fn validate_memory_path(path: &str, sandbox: &Sandbox<'_>) -> Result<PathBuf, PathValidationError> {
    if path.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if let Some(ch) = path.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(PathValidationError::ForbiddenCharacter {
            path: path.into(),
            ch,
        });
    }

    let lower = path.to_lowercase();
    if ENCODED_TRAVERSAL.iter().any(|p| lower.contains(p)) {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let rest = match path.strip_prefix(sandbox.marker) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => {
            return Err(PathValidationError::MissingRootMarker {
                path: path.into(),
                marker: sandbox.marker.into(),
            });
        }
    };

    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == ".." || *s == ".") {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    if let Some(scope) = sandbox.scope
        && segments.first() != Some(&scope)
    {
        return Err(PathValidationError::OutsideScope {
            path: path.into(),
            scope: scope.into(),
        });
    }

    let canonical_root =
        sandbox
            .root
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason: format!("Sandbox root: {e}"),
            })?;

    let resolved = segments
        .iter()
        .fold(canonical_root.clone(), |acc, seg| acc.join(seg));

    // Canonicalize the deepest existing ancestor so that symlinks inside the
    // sandbox cannot point the remaining components somewhere else.
    let mut existing = resolved.as_path();
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    while existing.symlink_metadata().is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let canonical_existing =
        existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason: e.to_string(),
            })?;

    if !canonical_existing.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot { path: path.into() });
    }

    let full = tail
        .iter()
        .rev()
        .fold(canonical_existing, |acc, name| acc.join(name));

    if full
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    Ok(full)
}
