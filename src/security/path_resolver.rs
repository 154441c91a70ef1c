//! Confinement of client-supplied paths to the serving root.
//!
//! # Algorithm
//! ```text
//! raw query value
//!     → percent-decode until fixed point (bounded)
//!     → reject NUL/control, backslash, absolute and drive-letter paths
//!     → lexical normalize (`.` dropped, `..` pops, popping past root rejects)
//!     → join to canonical root, canonicalize (symlinks resolved)
//!     → component-wise prefix check against the canonical root
//!     → re-canonicalize and re-check immediately before reading
//! ```

use std::path::{Component, Path, PathBuf};

use crate::config::FilesConfig;

/// Rounds of percent-decoding before input is considered hostile.
const MAX_DECODE_ROUNDS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path escapes the serving root")]
    Traversal,
    #[error("malformed path")]
    Malformed,
    #[error("file not found")]
    NotFound,
    #[error("file exceeds the size limit")]
    TooLarge,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PathError {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathError::Traversal => "traversal",
            PathError::Malformed => "malformed",
            PathError::NotFound => "not_found",
            PathError::TooLarge => "too_large",
            PathError::Io(_) => "io",
        }
    }
}

/// A client path that resolved to a location inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub requested: String,
    pub canonical: PathBuf,
    pub within_root: bool,
}

/// Resolves client paths against a single canonical serving root.
pub struct PathResolver {
    root: PathBuf,
    max_file_bytes: u64,
}

impl PathResolver {
    /// Canonicalizes `config.root`; fails if it does not exist.
    pub fn new(config: &FilesConfig) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(&config.root)?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("serving root {} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root,
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `raw` to a canonical path inside the root.
    pub async fn resolve(&self, raw: &str) -> Result<ResolvedPath, PathError> {
        let relative = normalize(&decode_fully(raw)?)?;

        let canonical = match tokio::fs::canonicalize(self.root.join(&relative)).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(PathError::NotFound),
            Err(e) => return Err(PathError::Io(e)),
        };

        if !canonical.starts_with(&self.root) {
            return Err(PathError::Traversal);
        }

        Ok(ResolvedPath {
            requested: raw.to_string(),
            canonical,
            within_root: true,
        })
    }

    /// Read a resolved file, re-checking confinement first so a symlink
    /// swapped in after resolution cannot redirect the read.
    pub async fn read(&self, resolved: &ResolvedPath) -> Result<Vec<u8>, PathError> {
        let current = match tokio::fs::canonicalize(&resolved.canonical).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(PathError::NotFound),
            Err(e) => return Err(PathError::Io(e)),
        };
        if current != resolved.canonical || !current.starts_with(&self.root) {
            return Err(PathError::Traversal);
        }

        let metadata = tokio::fs::metadata(&current).await?;
        if !metadata.is_file() {
            return Err(PathError::NotFound);
        }
        if metadata.len() > self.max_file_bytes {
            return Err(PathError::TooLarge);
        }

        Ok(tokio::fs::read(&current).await?)
    }
}

/// Percent-decode until the value stops changing. Every `%` must start a
/// valid escape and the result must be UTF-8.
fn decode_fully(raw: &str) -> Result<String, PathError> {
    let mut current = raw.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        if !has_valid_escapes(&current) {
            return Err(PathError::Malformed);
        }
        let decoded = match urlencoding::decode(&current) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return Err(PathError::Malformed),
        };
        if decoded == current {
            return Ok(current);
        }
        current = decoded;
    }
    if current.contains('%') {
        Err(PathError::Traversal)
    } else {
        Ok(current)
    }
}

fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || (i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit())
    })
}

/// Lexically normalize a decoded relative path.
fn normalize(decoded: &str) -> Result<PathBuf, PathError> {
    if decoded.is_empty() || decoded.chars().any(char::is_control) {
        return Err(PathError::Malformed);
    }
    if decoded.contains('\\') {
        return Err(PathError::Traversal);
    }
    if decoded.starts_with('/') || has_drive_prefix(decoded) {
        return Err(PathError::Traversal);
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PathError::Traversal);
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(PathError::Malformed);
    }

    let path: PathBuf = parts.iter().collect();
    // A segment may still parse as a root or prefix on some platforms.
    if path.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(PathError::Traversal);
    }
    Ok(path)
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
