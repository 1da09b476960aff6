// file: src/utils/fs.rs
// version: 1.3.0
// guid: d9e0f1a2-b3c4-5678-9012-345678def078

//! Filesystem helpers for operating on a (possibly re-rooted) filesystem
//!
//! All pipeline file operations take explicit absolute paths built from a
//! root prefix, so tests can run them against a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::utils::glob_match;

/// Create a directory and all parents
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Write a file, creating parent directories as needed
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Remove a file, directory tree or dangling symlink if it exists
///
/// Returns whether anything was removed. Symlinks are removed as links,
/// never followed.
pub fn remove_path(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    debug!("removed {}", path.display());
    Ok(true)
}

/// Expand a relative glob pattern beneath a root directory
///
/// Each path component may carry `*`/`?` wildcards; components are expanded
/// against the directory entries actually present. Only existing paths are
/// returned, sorted for stable processing order.
pub fn expand_path_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut current = vec![root.to_path_buf()];

    for component in pattern.split('/').filter(|c| !c.is_empty()) {
        let mut next = Vec::new();
        let is_glob = component.contains('*') || component.contains('?');

        for base in &current {
            if !is_glob {
                let candidate = base.join(component);
                if candidate.symlink_metadata().is_ok() {
                    next.push(candidate);
                }
                continue;
            }
            let entries = match fs::read_dir(base) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                if glob_match(component, &name.to_string_lossy()) {
                    next.push(base.join(name));
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    current.sort();
    Ok(current)
}

/// Copy a directory's contents into a destination directory
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    let mut options = fs_extra::dir::CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    fs_extra::dir::copy(src, dst, &options).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("copy {} -> {}: {e}", src.display(), dst.display()),
        )
    })?;
    Ok(())
}

/// Copy a single file, creating the destination's parent directories
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::copy(src, dst)?)
}

/// Move a file, falling back to copy+remove across filesystems
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}
