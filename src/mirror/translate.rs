//! Mapping between source-rooted and destination-rooted paths.

use std::path::{Path, PathBuf};

use super::error::MirrorError;

/// Rebase `path` from `source_root` onto `dest_root`.
///
/// The prefix is matched component-wise, so `/src2/a` is not under `/src`.
/// The source root itself maps to the destination root exactly.
pub fn translate(
    path: &Path,
    source_root: &Path,
    dest_root: &Path,
) -> Result<PathBuf, MirrorError> {
    let relative = path
        .strip_prefix(source_root)
        .map_err(|_| MirrorError::OutsideRoot {
            path: path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;

    if relative.as_os_str().is_empty() {
        Ok(dest_root.to_path_buf())
    } else {
        Ok(dest_root.join(relative))
    }
}

/// Rebase a destination path back onto the source root.
pub fn translate_inverse(
    path: &Path,
    dest_root: &Path,
    source_root: &Path,
) -> Result<PathBuf, MirrorError> {
    translate(path, dest_root, source_root)
}
