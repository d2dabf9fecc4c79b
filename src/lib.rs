pub mod cli;
pub mod config;
pub mod logging;
pub mod mirror;

pub use config::{LoggingConfig, MirrorConfig, Settings};
pub use mirror::{
    BatchReport, ChangeAggregator, ChangeBatch, EventKind, Mirror, MirrorBuilder, MirrorError,
    RawEvent, Synchronizer, WatchBackend, WatchRegistry,
};
