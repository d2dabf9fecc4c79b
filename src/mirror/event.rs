//! Raw change events and their classification from notify events.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};

/// What happened to a path, as far as mirroring cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Modified,
    Removed,
}

/// A single change notification for one source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Classify a notify event into raw events, one per affected path.
    ///
    /// Access events and the combined `RenameMode::Both` event yield nothing;
    /// backends that report a rename as `Both` also report its `From` and
    /// `To` halves separately. Ambiguous kinds are resolved by checking
    /// whether the path still exists.
    pub fn from_notify(event: &notify::Event) -> Vec<RawEvent> {
        use notify::EventKind as N;

        let classify: fn(&Path) -> Option<EventKind> = match event.kind {
            N::Create(_) => |_| Some(EventKind::Created),
            N::Remove(_) => |_| Some(EventKind::Removed),
            N::Modify(ModifyKind::Name(RenameMode::From)) => |_| Some(EventKind::Removed),
            N::Modify(ModifyKind::Name(RenameMode::To)) => |_| Some(EventKind::Created),
            N::Modify(ModifyKind::Name(RenameMode::Both)) => |_| None,
            N::Modify(ModifyKind::Name(_)) => |p| Some(by_existence(p, EventKind::Created)),
            N::Modify(_) => |_| Some(EventKind::Modified),
            N::Access(_) => |_| None,
            N::Any | N::Other => |p| Some(by_existence(p, EventKind::Modified)),
        };

        event
            .paths
            .iter()
            .filter_map(|path| classify(path).map(|kind| RawEvent::new(path.clone(), kind)))
            .collect()
    }
}

fn by_existence(path: &Path, present: EventKind) -> EventKind {
    if path.exists() {
        present
    } else {
        EventKind::Removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: notify::EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_create_write_remove() {
        let created = RawEvent::from_notify(&event(
            notify::EventKind::Create(CreateKind::File),
            "/src/a.txt",
        ));
        assert_eq!(created, vec![RawEvent::new("/src/a.txt", EventKind::Created)]);

        let written = RawEvent::from_notify(&event(
            notify::EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/src/a.txt",
        ));
        assert_eq!(written, vec![RawEvent::new("/src/a.txt", EventKind::Modified)]);

        let chmod = RawEvent::from_notify(&event(
            notify::EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            "/src/a.txt",
        ));
        assert_eq!(chmod[0].kind, EventKind::Modified);

        let removed = RawEvent::from_notify(&event(
            notify::EventKind::Remove(RemoveKind::Folder),
            "/src/dir",
        ));
        assert_eq!(removed, vec![RawEvent::new("/src/dir", EventKind::Removed)]);
    }

    #[test]
    fn test_rename_halves() {
        let from = RawEvent::from_notify(&event(
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            "/src/old.txt",
        ));
        assert_eq!(from, vec![RawEvent::new("/src/old.txt", EventKind::Removed)]);

        let to = RawEvent::from_notify(&event(
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            "/src/new.txt",
        ));
        assert_eq!(to, vec![RawEvent::new("/src/new.txt", EventKind::Created)]);

        let both = notify::Event::new(notify::EventKind::Modify(ModifyKind::Name(
            RenameMode::Both,
        )))
        .add_path(PathBuf::from("/src/old.txt"))
        .add_path(PathBuf::from("/src/new.txt"));
        assert!(RawEvent::from_notify(&both).is_empty());
    }

    #[test]
    fn test_ambiguous_rename_checks_existence() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "x").unwrap();
        let absent = dir.path().join("absent.txt");

        let kind = notify::EventKind::Modify(ModifyKind::Name(RenameMode::Any));
        let events = RawEvent::from_notify(
            &notify::Event::new(kind)
                .add_path(present.clone())
                .add_path(absent.clone()),
        );

        assert_eq!(
            events,
            vec![
                RawEvent::new(present, EventKind::Created),
                RawEvent::new(absent, EventKind::Removed),
            ]
        );
    }

    #[test]
    fn test_access_is_ignored() {
        let events = RawEvent::from_notify(&event(
            notify::EventKind::Access(AccessKind::Any),
            "/src/a.txt",
        ));
        assert!(events.is_empty());
    }
}
