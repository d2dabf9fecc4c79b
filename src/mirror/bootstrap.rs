//! Startup: destination checks and the one-time full copy.
//!
//! Runs before change monitoring begins. Every failure here is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::MirrorError;
use super::translate::translate;

fn bootstrap_err(path: &Path, e: impl std::fmt::Display) -> MirrorError {
    MirrorError::Bootstrap {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Canonicalize the source root. It must be an existing directory.
pub fn resolve_source(source: &Path) -> Result<PathBuf, MirrorError> {
    let root = source.canonicalize().map_err(|e| MirrorError::WatchFailed {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !root.is_dir() {
        return Err(MirrorError::WatchFailed {
            path: root,
            reason: "not a directory".to_string(),
        });
    }
    Ok(root)
}

/// Create missing destinations and canonicalize all of them.
///
/// A destination may not overlap the source tree: mirroring into the watched
/// tree would feed its own copies back as events.
pub fn resolve_destinations(
    source_root: &Path,
    destinations: &[PathBuf],
) -> Result<Vec<PathBuf>, MirrorError> {
    if destinations.is_empty() {
        return Err(MirrorError::InvalidDestination {
            path: PathBuf::new(),
            reason: "no destination directory given".to_string(),
        });
    }

    let mut resolved = Vec::with_capacity(destinations.len());
    for dest in destinations {
        let invalid = |reason: String| MirrorError::InvalidDestination {
            path: dest.clone(),
            reason,
        };

        fs::create_dir_all(dest).map_err(|e| invalid(e.to_string()))?;
        let canonical = dest.canonicalize().map_err(|e| invalid(e.to_string()))?;

        if !canonical.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        if canonical.starts_with(source_root) || source_root.starts_with(&canonical) {
            return Err(invalid(format!("overlaps source {}", source_root.display())));
        }
        if resolved.contains(&canonical) {
            return Err(invalid("listed twice".to_string()));
        }

        resolved.push(canonical);
    }

    Ok(resolved)
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub fn clear_dir(dir: &Path) -> Result<(), MirrorError> {
    for entry in fs::read_dir(dir).map_err(|e| bootstrap_err(dir, e))? {
        let entry = entry.map_err(|e| bootstrap_err(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| bootstrap_err(&path, e))?;

        if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .map_err(|e| bootstrap_err(&path, e))?;
    }
    Ok(())
}

/// Copy the source tree into `dest_root`. Returns the number of files copied.
pub fn copy_tree(source_root: &Path, dest_root: &Path) -> Result<usize, MirrorError> {
    let mut files = 0;

    for entry in WalkDir::new(source_root).min_depth(1) {
        let entry = entry.map_err(|e| bootstrap_err(e.path().unwrap_or(source_root), &e))?;
        let src = entry.path();
        let dest = translate(src, source_root, dest_root)?;

        if entry.file_type().is_dir() {
            let permissions = entry
                .metadata()
                .map_err(|e| bootstrap_err(src, e))?
                .permissions();
            fs::create_dir_all(&dest).map_err(|e| bootstrap_err(&dest, e))?;
            fs::set_permissions(&dest, permissions).map_err(|e| bootstrap_err(&dest, e))?;
        } else {
            fs::copy(src, &dest).map_err(|e| bootstrap_err(src, e))?;
            files += 1;
        }
    }

    Ok(files)
}

/// Clear every destination and repopulate it from the source.
pub fn replicate_all(source_root: &Path, destinations: &[PathBuf]) -> Result<(), MirrorError> {
    for dest in destinations {
        clear_dir(dest)?;
        let files = copy_tree(source_root, dest)?;
        crate::log_event!(
            "bootstrap",
            "replicated",
            "{} -> {} ({files} files)",
            source_root.display(),
            dest.display()
        );
    }
    Ok(())
}
