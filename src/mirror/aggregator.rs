//! Collapsing of raw change events into a single batch.
//!
//! Within one burst a path is either changed or removed, never both. A change
//! followed by a removal cancels out: the path never reached a copied state
//! that would need deleting.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use super::event::{EventKind, RawEvent};

/// Paths to replicate and paths to delete, as collected over one burst.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changed: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Total number of distinct paths in the batch.
    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }
}

/// Accumulates raw events until the engine decides the burst has settled.
#[derive(Debug, Default)]
pub struct ChangeAggregator {
    pending: ChangeBatch,
    /// Paths removed and then recreated in this burst. They existed in the
    /// destinations before the burst, so removing them again must not cancel.
    recreated: HashSet<PathBuf>,
}

impl ChangeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the pending batch.
    pub fn record(&mut self, event: RawEvent) {
        let RawEvent { path, kind } = event;
        match kind {
            EventKind::Removed => {
                let cancelled = self.pending.changed.remove(&path);
                if !cancelled || self.recreated.remove(&path) {
                    self.pending.removed.insert(path);
                }
            }
            EventKind::Created | EventKind::Modified => {
                // Deleted then recreated: the copy overwrites whatever the
                // destination holds, so the removal is dropped.
                if self.pending.removed.remove(&path) {
                    self.recreated.insert(path.clone());
                }
                self.pending.changed.insert(path);
            }
        }
    }

    /// Take the pending batch, leaving the aggregator empty.
    pub fn take(&mut self) -> ChangeBatch {
        self.recreated.clear();
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &ChangeBatch {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(p: &str) -> RawEvent {
        RawEvent::new(p, EventKind::Created)
    }
    fn modified(p: &str) -> RawEvent {
        RawEvent::new(p, EventKind::Modified)
    }
    fn removed(p: &str) -> RawEvent {
        RawEvent::new(p, EventKind::Removed)
    }

    #[test]
    fn test_repeated_changes_collapse() {
        let mut agg = ChangeAggregator::new();
        agg.record(created("/src/a.txt"));
        agg.record(modified("/src/a.txt"));
        agg.record(modified("/src/a.txt"));
        agg.record(modified("/src/a.txt"));

        let batch = agg.take();
        assert_eq!(batch.changed.len(), 1);
        assert!(batch.changed.contains(&PathBuf::from("/src/a.txt")));
        assert!(batch.removed.is_empty());
    }

    #[test]
    fn test_change_then_remove_cancels() {
        let mut agg = ChangeAggregator::new();
        agg.record(created("/src/tmp.txt"));
        agg.record(modified("/src/tmp.txt"));
        agg.record(removed("/src/tmp.txt"));

        let batch = agg.take();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_plain_remove_recorded_once() {
        let mut agg = ChangeAggregator::new();
        agg.record(removed("/src/old.txt"));
        agg.record(removed("/src/old.txt"));

        let batch = agg.take();
        assert!(batch.changed.is_empty());
        assert_eq!(batch.removed.len(), 1);
        assert!(batch.removed.contains(&PathBuf::from("/src/old.txt")));
    }

    #[test]
    fn test_remove_then_recreate_is_a_change() {
        let mut agg = ChangeAggregator::new();
        agg.record(removed("/src/a.txt"));
        agg.record(created("/src/a.txt"));

        let batch = agg.take();
        assert!(batch.removed.is_empty());
        assert_eq!(batch.changed.len(), 1);
    }

    #[test]
    fn test_path_in_at_most_one_set() {
        let mut agg = ChangeAggregator::new();
        let sequence = [
            removed("/src/x"),
            created("/src/x"),
            removed("/src/x"),
            modified("/src/y"),
            removed("/src/z"),
            modified("/src/z"),
        ];
        for event in sequence {
            agg.record(event);
            let pending = agg.pending();
            assert!(pending.changed.intersection(&pending.removed).next().is_none());
        }

        // x existed before the burst and is gone at the end of it
        let batch = agg.take();
        assert!(!batch.changed.contains(&PathBuf::from("/src/x")));
        assert!(batch.removed.contains(&PathBuf::from("/src/x")));
        assert!(batch.changed.contains(&PathBuf::from("/src/y")));
        assert!(batch.changed.contains(&PathBuf::from("/src/z")));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_recreated_marker_does_not_leak_into_next_burst() {
        let mut agg = ChangeAggregator::new();
        agg.record(removed("/src/a.txt"));
        agg.record(created("/src/a.txt"));
        agg.take();

        // New burst: a fresh create/remove pair cancels as usual
        agg.record(created("/src/a.txt"));
        agg.record(removed("/src/a.txt"));
        assert!(agg.take().is_empty());
    }

    #[test]
    fn test_take_clears() {
        let mut agg = ChangeAggregator::new();
        agg.record(created("/src/a.txt"));
        agg.record(removed("/src/b.txt"));
        assert_eq!(agg.len(), 2);

        let first = agg.take();
        assert_eq!(first.len(), 2);
        assert!(agg.is_empty());
        assert!(agg.take().is_empty());
    }
}
