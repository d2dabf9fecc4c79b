//! Change aggregation and dispatch engine.
//!
//! Mirrors a source tree into one or more destination trees, driven by
//! filesystem notifications.
//!
//! # Architecture
//!
//! ```text
//! notify watcher --(mpsc)--> Mirror (single task)
//!                              - ChangeAggregator: changed / removed sets
//!                              - quiescence timer
//!                                    |
//!                                    | settled batch
//!                                    v
//!                            Synchronizer
//!                              - one task per (path, destination)
//!                              - join_all, BatchReport
//!                              - WatchRegistry growth / pruning
//! ```

mod aggregator;
pub mod bootstrap;
mod engine;
mod error;
mod event;
mod registry;
mod sync;
mod translate;

pub use aggregator::{ChangeAggregator, ChangeBatch};
pub use engine::{Mirror, MirrorBuilder};
pub use error::MirrorError;
pub use event::{EventKind, RawEvent};
pub use registry::{NotifyBackend, WatchBackend, WatchRegistry};
pub use sync::{BatchReport, OpFailure, Synchronizer};
pub use translate::{translate, translate_inverse};
