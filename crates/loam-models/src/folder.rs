//! Validated vault folder paths.
//!
//! A folder is addressed by a relative, `/`-separated path such as
//! `art/color_spaces`. Validation is purely lexical; checks against the real
//! file system (symlinks, existence) belong to the vault index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory names that can never be used as (or inside) a folder path.
pub const RESERVED_NAMES: &[&str] = &["attachments", ".obsidian", ".git", ".trash"];

/// Characters that are rejected in folder names.
const FORBIDDEN_CHARS: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Reasons a folder path is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FolderPathError {
    /// Path is empty after trimming.
    #[error("folder path is empty")]
    Empty,

    /// Path is absolute.
    #[error("folder path must be relative: {0}")]
    Absolute(String),

    /// Path contains an empty, `.` or `..` component.
    #[error("folder path escapes the vault or has an empty segment: {0}")]
    Traversal(String),

    /// Path uses a hidden or reserved directory name.
    #[error("'{0}' is a reserved folder name")]
    Reserved(String),

    /// Path contains a character that is not allowed.
    #[error("folder name contains an invalid character: {0}")]
    InvalidChar(String),
}

/// A validated folder path relative to the vault root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderPath(String);

impl FolderPath {
    /// Parses and normalizes a user-supplied folder path.
    ///
    /// Surrounding whitespace and slashes are trimmed; every segment is
    /// trimmed as well, so `" art / colors/ "` becomes `art/colors`.
    pub fn parse(raw: &str) -> Result<Self, FolderPathError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('~') {
            return Err(FolderPathError::Absolute(trimmed.to_string()));
        }
        let trimmed = trimmed.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(FolderPathError::Empty);
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            let segment = segment.trim();
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(FolderPathError::Traversal(trimmed.to_string()));
            }
            if segment.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c)) {
                return Err(FolderPathError::InvalidChar(segment.to_string()));
            }
            if segment.starts_with('.')
                || RESERVED_NAMES
                    .iter()
                    .any(|reserved| reserved.eq_ignore_ascii_case(segment))
            {
                return Err(FolderPathError::Reserved(segment.to_string()));
            }
            segments.push(segment);
        }

        Ok(Self(segments.join("/")))
    }

    /// Returns the path as a `/`-separated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns the last segment, used as a display name.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Nesting depth (a top-level folder has depth 1).
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Resolves the folder against a vault root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |path, s| path.join(s))
    }

    /// Appends a child segment.
    pub fn join(&self, child: &str) -> Result<FolderPath, FolderPathError> {
        Self::parse(&format!("{}/{}", self.0, child))
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FolderPath {
    type Error = FolderPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FolderPath> for String {
    fn from(path: FolderPath) -> Self {
        path.0
    }
}

impl AsRef<str> for FolderPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
