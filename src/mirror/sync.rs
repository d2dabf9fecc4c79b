//! Replication of a settled batch into every destination.
//!
//! Each (path, destination) pair becomes one spawned task. The batch returns
//! once every task has finished; individual failures are logged and collected
//! in the [`BatchReport`], only structural failures end the batch with an
//! error.

use std::collections::{BTreeSet, HashSet};
use std::fs::Permissions;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use super::aggregator::ChangeBatch;
use super::error::MirrorError;
use super::registry::WatchRegistry;
use super::translate::translate;

/// A single failed copy, directory creation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// What one batch did across all destinations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub dirs_created: usize,
    pub files_copied: usize,
    pub removed: usize,
    /// Operations not attempted because their path vanished or was missing.
    pub skipped: usize,
    pub failures: Vec<OpFailure>,
}

impl BatchReport {
    /// Number of operations that were issued, whatever their outcome.
    pub fn operations(&self) -> usize {
        self.dirs_created + self.files_copied + self.removed + self.skipped + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::DirCreated => self.dirs_created += 1,
            Outcome::FileCopied => self.files_copied += 1,
            Outcome::Removed => self.removed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(failure) => self.failures.push(failure),
        }
    }
}

/// A path whose parent was removed or replaced by a file reports
/// `NotADirectory` rather than `NotFound`.
fn vanished(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

enum Outcome {
    DirCreated,
    FileCopied,
    Removed,
    Skipped,
    Failed(OpFailure),
}

/// One unit of fan-out work. Owns everything it touches.
enum Operation {
    CreateDir {
        dest: PathBuf,
        permissions: Permissions,
    },
    CopyFile {
        src: PathBuf,
        dest: PathBuf,
    },
    Remove {
        dest: PathBuf,
        dest_root: PathBuf,
    },
}

impl Operation {
    fn target(&self) -> &Path {
        match self {
            Operation::CreateDir { dest, .. }
            | Operation::CopyFile { dest, .. }
            | Operation::Remove { dest, .. } => dest,
        }
    }

    async fn apply(self) -> Outcome {
        match self {
            Operation::CreateDir { dest, permissions } => create_dir(dest, permissions).await,
            Operation::CopyFile { src, dest } => copy_file(src, dest).await,
            Operation::Remove { dest, dest_root } => remove(dest, &dest_root).await,
        }
    }
}

async fn create_dir(dest: PathBuf, permissions: Permissions) -> Outcome {
    let result: io::Result<()> = async {
        tokio::fs::create_dir_all(&dest).await?;
        tokio::fs::set_permissions(&dest, permissions).await
    }
    .await;

    match result {
        Ok(()) => {
            crate::log_event!("sync", "directory created", "{}", dest.display());
            Outcome::DirCreated
        }
        Err(e) => {
            tracing::error!("[sync] failed to create directory {}: {e}", dest.display());
            Outcome::Failed(OpFailure {
                path: dest,
                reason: e.to_string(),
            })
        }
    }
}

async fn copy_file(src: PathBuf, dest: PathBuf) -> Outcome {
    let result: io::Result<u64> = async {
        // The parent may be a directory created in this same batch
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dest).await
    }
    .await;

    match result {
        Ok(_) => {
            crate::log_event!("sync", "file copied", "{} -> {}", src.display(), dest.display());
            Outcome::FileCopied
        }
        Err(e) if vanished(&e) && !src.exists() => {
            crate::log_event!("sync", "vanished before copy, skipped", "{}", src.display());
            Outcome::Skipped
        }
        Err(e) => {
            tracing::error!(
                "[sync] failed to copy file {} -> {}: {e}",
                src.display(),
                dest.display()
            );
            Outcome::Failed(OpFailure {
                path: dest,
                reason: e.to_string(),
            })
        }
    }
}

async fn remove(dest: PathBuf, dest_root: &Path) -> Outcome {
    if dest.as_path() == dest_root {
        crate::debug_event!("sync", "destination root kept", "{}", dest.display());
        return Outcome::Skipped;
    }

    let meta = match tokio::fs::symlink_metadata(&dest).await {
        Ok(meta) => meta,
        Err(e) if vanished(&e) => {
            crate::debug_event!("sync", "not present, skipped", "{}", dest.display());
            return Outcome::Skipped;
        }
        Err(e) => {
            tracing::error!("[sync] cannot inspect {}: {e}", dest.display());
            return Outcome::Failed(OpFailure {
                path: dest,
                reason: e.to_string(),
            });
        }
    };

    let (result, what) = if meta.is_dir() {
        (tokio::fs::remove_dir_all(&dest).await, "directory")
    } else {
        (tokio::fs::remove_file(&dest).await, "file")
    };

    match result {
        Ok(()) => {
            crate::log_event!("sync", format!("{what} removed"), "{}", dest.display());
            Outcome::Removed
        }
        Err(e) => {
            tracing::error!("[sync] failed to remove {what} {}: {e}", dest.display());
            Outcome::Failed(OpFailure {
                path: dest,
                reason: e.to_string(),
            })
        }
    }
}

/// Direct children of `dir`. Unreadable entries are skipped: they vanished
/// or will show up as events of their own.
fn list_children(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(e) => {
                crate::debug_event!("sync", "discovery skipped entry", "{e}");
                None
            }
        })
        .collect()
}

type Pending = Vec<(PathBuf, JoinHandle<Outcome>)>;

/// Fans batches out to every destination.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    source_root: PathBuf,
    destinations: Arc<[PathBuf]>,
    prune_removed: bool,
}

impl Synchronizer {
    pub fn new(source_root: PathBuf, destinations: Arc<[PathBuf]>) -> Self {
        Self {
            source_root,
            destinations,
            prune_removed: true,
        }
    }

    /// Whether removed directories are dropped from the watch registry.
    pub fn prune_removed(mut self, prune: bool) -> Self {
        self.prune_removed = prune;
        self
    }

    pub fn destinations(&self) -> &[PathBuf] {
        &self.destinations
    }

    /// Replicate `batch` into every destination and wait for all of it.
    ///
    /// Directories seen for the first time are registered with `registry`
    /// and their current contents are replicated as well. Contents are listed
    /// only once the watch is in place, so an entry created in between is
    /// either listed or reported by the watch.
    pub async fn run(
        &self,
        batch: ChangeBatch,
        registry: &mut WatchRegistry,
    ) -> Result<BatchReport, MirrorError> {
        let mut report = BatchReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let mut pending: Pending = Vec::new();
        // Nothing issued may be left running, even when issuing stops early
        let issued = self.issue(batch, registry, &mut pending, &mut report).await;

        let (targets, handles): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        for (target, joined) in targets.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    tracing::error!("[sync] operation on {} aborted: {e}", target.display());
                    report.failures.push(OpFailure {
                        path: target,
                        reason: e.to_string(),
                    });
                }
            }
        }

        issued?;

        crate::log_event!(
            "sync",
            "batch done",
            "{} dirs created, {} files copied, {} removed, {} skipped, {} failed",
            report.dirs_created,
            report.files_copied,
            report.removed,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    async fn issue(
        &self,
        batch: ChangeBatch,
        registry: &mut WatchRegistry,
        pending: &mut Pending,
        report: &mut BatchReport,
    ) -> Result<(), MirrorError> {
        let ChangeBatch { changed, removed } = batch;

        // Ordered so a directory is handled before anything below it
        let mut work: BTreeSet<PathBuf> = changed;
        let mut seen: HashSet<PathBuf> = HashSet::new();

        while let Some(path) = work.pop_first() {
            seen.insert(path.clone());

            if path == self.source_root {
                crate::debug_event!("sync", "source root, skipped", "{}", path.display());
                continue;
            }

            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(e) if vanished(&e) => {
                    crate::log_event!(
                        "sync",
                        "vanished before sync, skipped",
                        "{}",
                        path.display()
                    );
                    report.skipped += self.destinations.len();
                    continue;
                }
                Err(e) => {
                    return Err(MirrorError::Stat {
                        path,
                        reason: e.to_string(),
                    });
                }
            };

            let is_dir = meta.is_dir();
            for dest_root in self.destinations.iter() {
                let dest = translate(&path, &self.source_root, dest_root)?;
                let op = if is_dir {
                    Operation::CreateDir {
                        dest,
                        permissions: meta.permissions(),
                    }
                } else {
                    Operation::CopyFile {
                        src: path.clone(),
                        dest,
                    }
                };
                spawn(op, pending);
            }

            if is_dir && registry.add_watch(&path)? {
                let dir = path.clone();
                match tokio::task::spawn_blocking(move || list_children(&dir)).await {
                    Ok(found) => work.extend(found.into_iter().filter(|p| !seen.contains(p))),
                    Err(e) => {
                        tracing::error!("[sync] listing {} aborted: {e}", path.display());
                        report.failures.push(OpFailure {
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        for path in removed {
            if self.prune_removed {
                registry.prune(&path);
            }

            for dest_root in self.destinations.iter() {
                let dest = translate(&path, &self.source_root, dest_root)?;
                spawn(
                    Operation::Remove {
                        dest,
                        dest_root: dest_root.clone(),
                    },
                    pending,
                );
            }
        }

        Ok(())
    }
}

fn spawn(op: Operation, pending: &mut Pending) {
    let target = op.target().to_path_buf();
    pending.push((target, tokio::spawn(op.apply())));
}
