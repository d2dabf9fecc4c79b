//! Registry of watched source directories.
//!
//! Watches are non-recursive: every directory of the source tree is
//! registered on its own, so a directory created later has to be added
//! explicitly before its children produce events.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use walkdir::WalkDir;

use super::error::MirrorError;

/// Something that can start and stop observing a single directory.
pub trait WatchBackend: Send {
    /// Start observing `path` (non-recursively).
    fn watch(&mut self, path: &Path) -> Result<(), MirrorError>;

    /// Stop observing `path`.
    fn unwatch(&mut self, path: &Path) -> Result<(), MirrorError>;
}

/// Backend over the platform notify watcher.
pub struct NotifyBackend {
    watcher: notify::RecommendedWatcher,
}

impl NotifyBackend {
    pub fn new(watcher: notify::RecommendedWatcher) -> Self {
        Self { watcher }
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Path) -> Result<(), MirrorError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| MirrorError::WatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), MirrorError> {
        self.watcher
            .unwatch(path)
            .map_err(|e| MirrorError::WatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// The set of directories currently observed.
pub struct WatchRegistry {
    backend: Box<dyn WatchBackend>,
    dirs: HashSet<PathBuf>,
}

impl WatchRegistry {
    pub fn new(backend: Box<dyn WatchBackend>) -> Self {
        Self {
            backend,
            dirs: HashSet::new(),
        }
    }

    /// Start observing a directory.
    ///
    /// Returns `Ok(false)` if the directory was already registered.
    pub fn add_watch(&mut self, path: &Path) -> Result<bool, MirrorError> {
        if self.dirs.contains(path) {
            return Ok(false);
        }

        if let Err(e) = self.backend.watch(path) {
            tracing::error!("[registry] failed to watch {}: {e}", path.display());
            return Err(e);
        }

        self.dirs.insert(path.to_path_buf());
        crate::log_event!("registry", "watching directory", "{}", path.display());
        Ok(true)
    }

    /// Register `root` and every directory below it.
    ///
    /// Any directory that cannot be read or watched fails the whole seed.
    pub fn seed(&mut self, root: &Path) -> Result<usize, MirrorError> {
        let mut added = 0;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| MirrorError::Walk {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                reason: e.to_string(),
            })?;

            if entry.file_type().is_dir() && self.add_watch(entry.path())? {
                added += 1;
            }
        }

        crate::log_event!(
            "registry",
            "seeded",
            "{added} directories under {}",
            root.display()
        );
        Ok(added)
    }

    /// Unregister `path` and every registered directory below it.
    ///
    /// Returns how many directories were dropped. Unwatch errors are expected
    /// (the OS usually drops a watch when its directory is deleted) and only
    /// logged at debug level.
    pub fn prune(&mut self, path: &Path) -> usize {
        let stale: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|dir| dir.starts_with(path))
            .cloned()
            .collect();

        for dir in &stale {
            self.dirs.remove(dir);
            match self.backend.unwatch(dir) {
                Ok(()) => crate::log_event!("registry", "unwatched", "{}", dir.display()),
                Err(e) => crate::debug_event!("registry", "unwatch", "{e}"),
            }
        }

        stale.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingBackend;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_add_watch_is_idempotent() {
        let backend = RecordingBackend::default();
        let mut registry = WatchRegistry::new(Box::new(backend.clone()));

        assert!(registry.add_watch(Path::new("/src/dir")).unwrap());
        assert!(!registry.add_watch(Path::new("/src/dir")).unwrap());

        assert_eq!(backend.watched(), vec![PathBuf::from("/src/dir")]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(Path::new("/src/dir")));
    }

    #[test]
    fn test_add_watch_failure_leaves_registry_unchanged() {
        let backend = RecordingBackend::refusing("/src/bad");
        let mut registry = WatchRegistry::new(Box::new(backend));

        let err = registry.add_watch(Path::new("/src/bad")).unwrap_err();
        assert!(matches!(err, MirrorError::WatchFailed { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_seed_registers_every_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("a/file.txt"), "x").unwrap();

        let backend = RecordingBackend::default();
        let mut registry = WatchRegistry::new(Box::new(backend.clone()));

        let added = registry.seed(root).unwrap();
        assert_eq!(added, 4);
        assert!(registry.contains(root));
        assert!(registry.contains(&root.join("a")));
        assert!(registry.contains(&root.join("a/b")));
        assert!(registry.contains(&root.join("c")));
        assert!(!registry.contains(&root.join("a/file.txt")));
    }

    #[test]
    fn test_seed_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();

        let backend = RecordingBackend::refusing(root.join("sub"));
        let mut registry = WatchRegistry::new(Box::new(backend));

        assert!(registry.seed(root).is_err());
    }

    #[test]
    fn test_seed_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let backend = RecordingBackend::default();
        let mut registry = WatchRegistry::new(Box::new(backend));

        let err = registry.seed(&temp_dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, MirrorError::Walk { .. }));
    }

    #[test]
    fn test_prune_removes_subtree() {
        let backend = RecordingBackend::default();
        let mut registry = WatchRegistry::new(Box::new(backend.clone()));
        for dir in ["/src", "/src/dir", "/src/dir/nested", "/src/dirt"] {
            registry.add_watch(Path::new(dir)).unwrap();
        }

        let dropped = registry.prune(Path::new("/src/dir"));

        assert_eq!(dropped, 2);
        assert!(registry.contains(Path::new("/src")));
        // Component-wise prefix: a sibling sharing the string prefix survives
        assert!(registry.contains(Path::new("/src/dirt")));
        assert!(!registry.contains(Path::new("/src/dir/nested")));

        let mut unwatched = backend.unwatched();
        unwatched.sort();
        assert_eq!(
            unwatched,
            vec![PathBuf::from("/src/dir"), PathBuf::from("/src/dir/nested")]
        );
    }

    #[test]
    fn test_prune_unknown_path_is_noop() {
        let backend = RecordingBackend::default();
        let mut registry = WatchRegistry::new(Box::new(backend.clone()));
        registry.add_watch(Path::new("/src")).unwrap();

        assert_eq!(registry.prune(Path::new("/src/file.txt")), 0);
        assert!(backend.unwatched().is_empty());
    }
}
