//! Safe file moves.
//!
//! [`SafeMover`] moves one file into an existing folder. It never creates
//! directories, never overwrites, and has no delete operation. Every
//! precondition is checked before the first write; a violated precondition
//! leaves the filesystem untouched.
//!
//! The file is placed at the target with a hard link, which the OS refuses
//! to create over an existing entry, so a file appearing at the target after
//! the precondition check is never replaced. The source link is removed
//! afterwards. Across volumes the content is first copied and fsynced into a
//! hidden temporary inside the destination, which is then linked into place.
//! If the source cannot be removed, the new link is removed instead so
//! exactly one copy remains. A crash between placing the target and removing
//! the source can leave both copies; it cannot lose data.
//!
//! On filesystems without hard links the mover falls back to `rename` after
//! re-checking the target, which leaves a narrow window in which a file
//! created at the target could be replaced.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub enum MoveError {
    /// The source does not exist or is not a regular file.
    SourceMissing(PathBuf),
    /// The destination does not exist or is not a directory.
    DestinationMissing(PathBuf),
    /// Something already exists at the target path.
    DestinationOccupied(PathBuf),
    /// The source has no file name to carry over.
    NoFileName(PathBuf),
    /// An I/O error after the preconditions held.
    Io { context: String, source: io::Error },
}

impl MoveError {
    /// Whether this is a precondition violation (no filesystem change made).
    pub fn is_precondition(&self) -> bool {
        !matches!(self, MoveError::Io { .. })
    }
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::SourceMissing(p) => write!(f, "source file not found: {}", p.display()),
            MoveError::DestinationMissing(p) => {
                write!(f, "destination folder does not exist: {}", p.display())
            }
            MoveError::DestinationOccupied(p) => {
                write!(f, "refusing to overwrite existing path: {}", p.display())
            }
            MoveError::NoFileName(p) => write!(f, "source has no file name: {}", p.display()),
            MoveError::Io { context, source } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for MoveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MoveError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> MoveError {
    let context = context.into();
    move |source| MoveError::Io { context, source }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafeMover;

impl SafeMover {
    pub fn new() -> Self {
        Self
    }

    /// Where `src` would land inside `dest_dir`.
    pub fn target_path(src: &Path, dest_dir: &Path) -> Result<PathBuf, MoveError> {
        let name = src
            .file_name()
            .ok_or_else(|| MoveError::NoFileName(src.to_path_buf()))?;
        Ok(dest_dir.join(name))
    }

    /// Check every precondition without touching the filesystem.
    pub fn check(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf, MoveError> {
        if !src.is_file() {
            return Err(MoveError::SourceMissing(src.to_path_buf()));
        }
        if !dest_dir.is_dir() {
            return Err(MoveError::DestinationMissing(dest_dir.to_path_buf()));
        }
        let target = Self::target_path(src, dest_dir)?;
        if target.symlink_metadata().is_ok() {
            return Err(MoveError::DestinationOccupied(target));
        }
        Ok(target)
    }

    /// Move `src` into `dest_dir`, returning the new path.
    pub fn move_into(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf, MoveError> {
        let target = self.check(src, dest_dir)?;
        match place(src, &target) {
            Ok(Placed::Renamed) => {
                debug!(from = %src.display(), to = %target.display(), "renamed");
                Ok(target)
            }
            Ok(Placed::Linked) => {
                remove_source(src, &target)?;
                debug!(from = %src.display(), to = %target.display(), "moved");
                Ok(target)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(MoveError::DestinationOccupied(target))
            }
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                debug!(from = %src.display(), to = %target.display(), "crossing volumes, copying");
                self.copy_then_remove(src, dest_dir, &target)?;
                Ok(target)
            }
            Err(e) => Err(MoveError::Io {
                context: format!("failed to move {} to {}", src.display(), target.display()),
                source: e,
            }),
        }
    }

    fn copy_then_remove(&self, src: &Path, dest_dir: &Path, target: &Path) -> Result<(), MoveError> {
        let temp = dest_dir.join(format!(".docsort-{}.partial", Uuid::new_v4()));

        if let Err(e) = copy_synced(src, &temp) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        match place(&temp, target) {
            Ok(Placed::Linked) => {
                if let Err(e) = fs::remove_file(&temp) {
                    warn!(temp = %temp.display(), error = %e, "could not remove temporary copy");
                }
            }
            Ok(Placed::Renamed) => {}
            Err(e) => {
                let _ = fs::remove_file(&temp);
                if e.kind() == ErrorKind::AlreadyExists {
                    return Err(MoveError::DestinationOccupied(target.to_path_buf()));
                }
                return Err(MoveError::Io {
                    context: format!("failed to place {}", target.display()),
                    source: e,
                });
            }
        }
        remove_source(src, target)
    }
}

enum Placed {
    /// `to` is a new link; `from` still exists.
    Linked,
    /// `from` was renamed to `to`.
    Renamed,
}

/// Put `from` at `to` without replacing anything already at `to`.
///
/// `AlreadyExists` and `CrossesDevices` are returned to the caller; any
/// other link failure (no hard-link support) falls back to a rename.
fn place(from: &Path, to: &Path) -> io::Result<Placed> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(Placed::Linked),
        Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::CrossesDevices) => {
            Err(e)
        }
        Err(e) => {
            debug!(to = %to.display(), error = %e, "hard link unavailable, renaming");
            if to.symlink_metadata().is_ok() {
                return Err(io::Error::from(ErrorKind::AlreadyExists));
            }
            fs::rename(from, to).map(|()| Placed::Renamed)
        }
    }
}

/// Drop the source once `target` holds the file, or roll `target` back.
fn remove_source(src: &Path, target: &Path) -> Result<(), MoveError> {
    if let Err(e) = fs::remove_file(src) {
        warn!(source = %src.display(), error = %e, "could not remove source, rolling back");
        let _ = fs::remove_file(target);
        return Err(MoveError::Io {
            context: format!("failed to remove {} after placing it", src.display()),
            source: e,
        });
    }
    Ok(())
}

fn copy_synced(src: &Path, temp: &Path) -> Result<(), MoveError> {
    fs::copy(src, temp).map_err(io_err(format!(
        "failed to copy {} to {}",
        src.display(),
        temp.display()
    )))?;
    File::open(temp)
        .and_then(|f| f.sync_all())
        .map_err(io_err(format!("failed to sync {}", temp.display())))
}
