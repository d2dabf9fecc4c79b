//! CLI module for treemirror.
//!
//! Argument parsing, and the overrides the arguments apply to the settings.

pub mod args;

pub use args::Cli;
