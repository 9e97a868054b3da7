//! Read-through view of the notes vault.
//!
//! The directory tree is the source of truth. Nothing here is cached:
//! every listing and every note read goes back to the file system, so edits
//! made outside the bot are observed on the next access.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use loam_models::{FolderPath, NoteId, RESERVED_NAMES};
use loam_persistence::atomic::atomic_write;
use tracing::{debug, info, warn};

use crate::error::{LoamError, Result};
use crate::note::{self, NoteMetadata, NoteWrite};

/// Subdirectory holding a folder's uploaded files.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Result of [`VaultIndex::ensure_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub path: FolderPath,
    /// True if the call created the directory.
    pub created: bool,
}

/// A markdown note found in a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMeta {
    pub id: NoteId,
    /// File name including the `.md` extension.
    pub name: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

impl NoteMeta {
    /// File name without the extension.
    pub fn title(&self) -> &str {
        self.name.strip_suffix(".md").unwrap_or(&self.name)
    }
}

/// Index over the vault's folders and notes.
#[derive(Debug, Clone)]
pub struct VaultIndex {
    root: PathBuf,
}

impl VaultIndex {
    /// Opens the vault at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| LoamError::io(&root, e))?;
        let root = root.canonicalize().map_err(|e| LoamError::io(&root, e))?;
        info!(root = %root.display(), "Opened vault");
        Ok(Self { root })
    }

    /// Canonical vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every folder in the vault, sorted, skipping hidden and reserved
    /// directories.
    pub fn list_folders(&self) -> Result<Vec<FolderPath>> {
        let mut folders = Vec::new();
        self.scan_dir(&self.root, None, &mut folders)?;
        folders.sort();
        Ok(folders)
    }

    fn scan_dir(&self, dir: &Path, prefix: Option<&FolderPath>, out: &mut Vec<FolderPath>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| LoamError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| LoamError::io(dir, e))?;
            // Symlinked directories are not followed
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_hidden_or_reserved(name) {
                continue;
            }
            let folder = match prefix {
                Some(parent) => parent.join(name),
                None => FolderPath::parse(name),
            };
            match folder {
                Ok(folder) => {
                    self.scan_dir(&entry.path(), Some(&folder), out)?;
                    out.push(folder);
                }
                Err(e) => debug!(dir = %entry.path().display(), error = %e, "Skipping unaddressable directory"),
            }
        }
        Ok(())
    }

    /// Returns true if the folder exists as a directory.
    pub fn folder_exists(&self, folder: &FolderPath) -> bool {
        folder.to_path(&self.root).is_dir()
    }

    /// Creates a folder (and its `attachments/` subfolder) if missing.
    ///
    /// Rejects malformed paths, reserved names and paths that would leave
    /// the vault through a symlink. Nothing is created on rejection.
    pub fn ensure_folder(&self, raw: &str) -> Result<Folder> {
        let path = FolderPath::parse(raw).map_err(|e| LoamError::invalid_path(raw, e))?;
        let dir = path.to_path(&self.root);
        self.check_within_root(&dir, raw)?;

        let created = !dir.is_dir();
        fs::create_dir_all(dir.join(ATTACHMENTS_DIR)).map_err(|e| LoamError::io(&dir, e))?;
        if created {
            info!(folder = %path, "Created folder");
        }
        Ok(Folder { path, created })
    }

    /// Verifies that the deepest existing ancestor of `target` is a
    /// directory that resolves inside the vault root.
    fn check_within_root(&self, target: &Path, raw: &str) -> Result<()> {
        let mut existing = target;
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        if !existing.is_dir() {
            return Err(LoamError::InvalidPath {
                path: raw.to_string(),
                reason: "a file with that name is in the way".to_string(),
            });
        }
        let resolved = existing
            .canonicalize()
            .map_err(|e| LoamError::io(existing, e))?;
        if resolved.starts_with(&self.root) {
            Ok(())
        } else {
            warn!(path = %raw, resolved = %resolved.display(), "Folder escapes vault root");
            Err(LoamError::InvalidPath {
                path: raw.to_string(),
                reason: "resolves outside the vault".to_string(),
            })
        }
    }

    /// Lists the markdown notes directly inside a folder, most recently
    /// modified first, ties broken by name.
    pub fn list_notes(&self, folder: &FolderPath) -> Result<Vec<NoteMeta>> {
        let dir = folder.to_path(&self.root);
        if !dir.is_dir() {
            return Err(LoamError::folder_not_found(folder));
        }

        let mut notes = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| LoamError::io(&dir, e))? {
            let entry = entry.map_err(|e| LoamError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.to_ascii_lowercase().ends_with(".md") {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or_default();
            notes.push(NoteMeta {
                id: note_id(folder, &name),
                name,
                modified,
                size: meta.len(),
            });
        }

        notes.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(notes)
    }

    /// Resolves a note id to a path inside the vault.
    fn note_path(&self, id: &NoteId) -> Result<PathBuf> {
        let (folder, name) = split_note_id(id)?;
        Ok(folder.to_path(&self.root).join(name))
    }

    /// Reads a note's current content from disk.
    pub fn read_note(&self, id: &NoteId) -> Result<String> {
        let path = self.note_path(id)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LoamError::NotFound {
                kind: "note".to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(LoamError::io(path, e)),
        }
    }

    /// Writes a note into `folder`.
    ///
    /// A missing note is created with front-matter. An existing note is
    /// re-read and a dated section is appended, so external edits made
    /// since the last turn are preserved.
    pub fn write_note(
        &self,
        folder: &FolderPath,
        name: &str,
        body: &str,
        meta: &NoteMetadata,
    ) -> Result<(NoteId, NoteWrite)> {
        let name = note::normalize_note_name(name).ok_or_else(|| LoamError::InvalidPath {
            path: name.to_string(),
            reason: "not a valid note name".to_string(),
        })?;
        if !self.folder_exists(folder) {
            return Err(LoamError::folder_not_found(folder));
        }

        let id = note_id(folder, &name);
        let path = folder.to_path(&self.root).join(&name);
        let now = Utc::now();

        let (content, outcome) = match fs::read_to_string(&path) {
            Ok(existing) => (note::render_append(&existing, body, meta, now), NoteWrite::Appended),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (note::render_new(body, meta, now), NoteWrite::Created)
            }
            Err(e) => return Err(LoamError::io(path, e)),
        };

        atomic_write(&path, content.as_bytes())?;
        info!(note = %id, outcome = ?outcome, "Wrote note");
        Ok((id, outcome))
    }

    /// Finds the note a wikilink points to.
    ///
    /// `target` is tried relative to `folder` first, then relative to the
    /// vault root.
    pub fn resolve_link(&self, folder: &FolderPath, target: &str) -> Option<NoteId> {
        let target = target.trim().trim_start_matches('/');
        let (dir, name) = match target.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, target),
        };
        let name = note::normalize_note_name(name)?;

        let mut candidates = Vec::new();
        match dir {
            Some(dir) => {
                if let Ok(nested) = folder.join(dir) {
                    candidates.push(nested);
                }
                if let Ok(absolute) = FolderPath::parse(dir) {
                    candidates.push(absolute);
                }
            }
            None => candidates.push(folder.clone()),
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.to_path(&self.root).join(&name).is_file())
            .map(|candidate| note_id(&candidate, &name))
    }

    /// Saves an uploaded file into the folder's `attachments/` directory.
    ///
    /// Returns the path relative to the folder, e.g. `attachments/paper.pdf`.
    /// Existing files are never overwritten; a numeric suffix is added instead.
    pub fn save_attachment(&self, folder: &FolderPath, file_name: &str, data: &[u8]) -> Result<String> {
        if !self.folder_exists(folder) {
            return Err(LoamError::folder_not_found(folder));
        }
        let dir = folder.to_path(&self.root).join(ATTACHMENTS_DIR);
        fs::create_dir_all(&dir).map_err(|e| LoamError::io(&dir, e))?;

        let name = unique_file_name(&dir, &sanitize_file_name(file_name));
        atomic_write(&dir.join(&name), data)?;
        info!(folder = %folder, file = %name, bytes = data.len(), "Saved attachment");
        Ok(format!("{}/{}", ATTACHMENTS_DIR, name))
    }
}

fn is_hidden_or_reserved(name: &str) -> bool {
    name.starts_with('.') || RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn note_id(folder: &FolderPath, name: &str) -> NoteId {
    NoteId::from_string(format!("{}/{}", folder, name))
}

fn split_note_id(id: &NoteId) -> Result<(FolderPath, String)> {
    let invalid = || LoamError::InvalidPath {
        path: id.to_string(),
        reason: "not a note id".to_string(),
    };
    let (folder, name) = id.as_str().rsplit_once('/').ok_or_else(invalid)?;
    let folder = FolderPath::parse(folder).map_err(|e| LoamError::invalid_path(id.as_str(), e))?;
    let name = note::normalize_note_name(name).ok_or_else(invalid)?;
    Ok((folder, name))
}

/// Replaces characters that are unsafe in file names.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Returns `name`, or `stem_N.ext` with the first free N, inside `dir`.
fn unique_file_name(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        })
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or_else(|| name.to_string())
}
