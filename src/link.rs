use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::models::{LinkKind, Linked};

/// Create `dir` (owner-only on unix) if it does not exist yet.
///
/// Another worker may create it between the check and the create; that
/// `AlreadyExists` is not an error.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    match builder.create(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

fn file_name(source: &Path) -> io::Result<&OsStr> {
    source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })
}

fn prefixed(name: &OsStr, dir: &Path) -> PathBuf {
    let mut prefixed = Uuid::new_v4().simple().to_string();
    prefixed.push('-');
    prefixed.push_str(&name.to_string_lossy());
    dir.join(prefixed)
}

/// Destination path for `source` inside `dir`. An occupied name gets a
/// random prefix.
pub fn target_path(source: &Path, dir: &Path) -> io::Result<PathBuf> {
    let name = file_name(source)?;

    let target = dir.join(name);
    // symlink_metadata so a dangling symlink still counts as taken
    if target.symlink_metadata().is_err() {
        return Ok(target);
    }

    loop {
        let candidate = prefixed(name, dir);
        if candidate.symlink_metadata().is_err() {
            return Ok(candidate);
        }
    }
}

/// Link `source` into `dir`, trying a hard link before a symbolic one.
///
/// Returns the error of the symbolic link attempt when both fail.
pub fn link_into(source: &Path, dir: &Path) -> io::Result<Linked> {
    ensure_dir(dir)?;
    let target = target_path(source, dir)?;
    link_as(source, dir, target)
}

/// Link `source` at `target`. Another worker may take the name between
/// `target_path` and the link call; an `AlreadyExists` from either link
/// kind moves on to a fresh prefixed name in `dir`.
pub fn link_as(source: &Path, dir: &Path, mut target: PathBuf) -> io::Result<Linked> {
    let name = file_name(source)?;

    loop {
        match std::fs::hard_link(source, &target) {
            Ok(()) => {
                return Ok(Linked {
                    path: target,
                    kind: LinkKind::Hard,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} was taken, retrying", target.display());
                target = prefixed(name, dir);
                continue;
            }
            Err(e) => debug!("Hard link {} failed: {}", target.display(), e),
        }

        let absolute = std::fs::canonicalize(source)?;
        match symlink(&absolute, &target) {
            Ok(()) => {
                return Ok(Linked {
                    path: target,
                    kind: LinkKind::Symbolic,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} was taken, retrying", target.display());
                target = prefixed(name, dir);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, target)
}
