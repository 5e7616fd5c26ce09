//! Writing rendered files to disk.
//!
//! Every file goes to a temporary sibling first and is renamed into place,
//! so an interrupted run never leaves a half-written file. The manifest is
//! written last, after every file write has completed; a failure anywhere
//! before that leaves the previous manifest (or none) in place.

use super::manifest::{GenerationManifest, ManifestEntry};
use super::render::RenderedFile;
use crate::error::{TiergenError, TiergenResult};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// How [`FileMaterializer::materialize`] treats the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeMode {
    /// Fresh project: the root must not contain a manifest.
    Create,
    /// Report what would change, write nothing.
    DryRun,
    /// Write the given files into an existing project (migration).
    Apply,
}

/// What happened, or would happen, to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    Created,
    Overwritten,
    /// Content on disk already matched; nothing written.
    Unchanged,
    WouldCreate,
    /// Unified diff from the current content to the rendered one.
    WouldOverwrite { diff: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub action: FileAction,
}

/// Result of a materialize call.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// The manifest that was stored, or would be stored in dry-run mode
    pub manifest: GenerationManifest,
    /// One per input file, ordered by path
    pub outcomes: Vec<FileOutcome>,
}

impl Materialized {
    pub fn count(&self, pred: impl Fn(&FileAction) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.action)).count()
    }
}

/// Writes rendered files under an output root and records them in a manifest.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    pool: Arc<ThreadPool>,
}

impl FileMaterializer {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    /// Write `files` under `root` and store `manifest` with an entry for each.
    ///
    /// Entries already in `manifest` for paths not in `files` are kept as they
    /// are; migration uses this to carry files it decided not to write.
    ///
    /// # Errors
    ///
    /// - [`TiergenError::AlreadyExists`] in `Create` mode when `root` holds a manifest
    /// - [`TiergenError::FileWrite`] when a write fails; remaining writes are
    ///   abandoned and the manifest is not touched
    pub fn materialize(
        &self,
        files: &[RenderedFile],
        root: &Path,
        mode: MaterializeMode,
        mut manifest: GenerationManifest,
    ) -> TiergenResult<Materialized> {
        if mode == MaterializeMode::Create && GenerationManifest::exists_in(root) {
            return Err(TiergenError::AlreadyExists {
                manifest: GenerationManifest::path_in(root),
            });
        }

        let mut outcomes = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| match mode {
                    MaterializeMode::DryRun => preview(file, root),
                    MaterializeMode::Create | MaterializeMode::Apply => write_file(file, root),
                })
                .collect::<TiergenResult<Vec<_>>>()
        })?;
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        for file in files {
            manifest.files.insert(
                file.path.clone(),
                ManifestEntry::written(file, manifest.tier, manifest.generated_at),
            );
        }

        if mode != MaterializeMode::DryRun {
            manifest.store(root)?;
            info!(
                root = %root.display(),
                files = files.len(),
                tracked = manifest.files.len(),
                "materialized project"
            );
        }

        Ok(Materialized { manifest, outcomes })
    }
}

fn read_existing(path: &Path) -> TiergenResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(TiergenError::io(path, err)),
    }
}

fn write_file(file: &RenderedFile, root: &Path) -> TiergenResult<FileOutcome> {
    let dest = root.join(&file.path);
    let action = match read_existing(&dest)? {
        Some(existing) if existing == file.content => FileAction::Unchanged,
        Some(_) => {
            write_atomic(&dest, &file.content)?;
            FileAction::Overwritten
        }
        None => {
            write_atomic(&dest, &file.content)?;
            FileAction::Created
        }
    };
    debug!(path = %file.path, fingerprint = %file.fingerprint.short(), action = ?action, "materialized file");
    Ok(FileOutcome {
        path: file.path.clone(),
        action,
    })
}

fn preview(file: &RenderedFile, root: &Path) -> TiergenResult<FileOutcome> {
    let dest = root.join(&file.path);
    let action = match read_existing(&dest)? {
        Some(existing) if existing == file.content => FileAction::Unchanged,
        Some(existing) => FileAction::WouldOverwrite {
            diff: unified_diff(&file.path, &existing, &file.content),
        },
        None => FileAction::WouldCreate,
    };
    Ok(FileOutcome {
        path: file.path.clone(),
        action,
    })
}

/// Unified diff `old` → `new`, labelled with `path`.
pub fn unified_diff(path: &str, old: &[u8], new: &[u8]) -> String {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    let patch = diffy::create_patch(&old, &new);
    let body = diffy::PatchFormatter::new().fmt_patch(&patch).to_string();
    // diffy labels the sides `original` / `modified`
    body.replacen("--- original", &format!("--- a/{path}"), 1)
        .replacen("+++ modified", &format!("+++ b/{path}"), 1)
}

/// Write `bytes` to `path` through a temporary file in the same directory.
///
/// Parent directories are created. An existing file's permissions are kept;
/// new files get `0o644` on unix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> TiergenResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| TiergenError::file_write(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| TiergenError::file_write(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| TiergenError::file_write(path, e))?;

    let permissions = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    };
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| TiergenError::file_write(path, e))?;
    }

    tmp.persist(path)
        .map_err(|e| TiergenError::file_write(path, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
