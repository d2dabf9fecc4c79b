//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Mirror a directory tree into one or more destinations
#[derive(Parser, Debug)]
#[command(
    name = "treemirror",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mirror a directory tree into one or more destinations",
    long_about = "Copy SOURCE into every DEST, then keep them in sync from filesystem \
                  notifications. Changes are collected until the source has been quiet \
                  for the quiescence interval, then applied to all destinations at once.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Directory to mirror
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination directories (created if missing, cleared at startup)
    #[arg(value_name = "DEST", required = true, num_args = 1..)]
    pub destinations: Vec<PathBuf>,

    /// Path to a treemirror.toml settings file
    #[arg(short, long, env = "TREEMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Quiet period in milliseconds before a batch is applied (overrides config)
    #[arg(short, long, value_name = "MS")]
    pub quiescence_ms: Option<u64>,

    /// Keep watching directories after they are removed from the source
    #[arg(long)]
    pub no_prune: bool,

    /// Do not clear and repopulate destinations at startup
    #[arg(long)]
    pub skip_initial_copy: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(ms) = self.quiescence_ms {
            settings.mirror.quiescence_ms = ms;
        }
        if self.no_prune {
            settings.mirror.prune_removed = false;
        }
        if self.skip_initial_copy {
            settings.mirror.initial_copy = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_source_and_destinations() {
        let cli = Cli::try_parse_from(["treemirror", "/src", "/d1", "/d2"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("/src"));
        assert_eq!(
            cli.destinations,
            vec![PathBuf::from("/d1"), PathBuf::from("/d2")]
        );
        assert!(cli.quiescence_ms.is_none());
    }

    #[test]
    fn test_missing_destination_is_rejected() {
        assert!(Cli::try_parse_from(["treemirror", "/src"]).is_err());
        assert!(Cli::try_parse_from(["treemirror"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_settings() {
        let cli = Cli::try_parse_from([
            "treemirror",
            "--quiescence-ms",
            "200",
            "--no-prune",
            "--skip-initial-copy",
            "/src",
            "/d1",
        ])
        .unwrap();

        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.mirror.quiescence_ms, 200);
        assert!(!settings.mirror.prune_removed);
        assert!(!settings.mirror.initial_copy);
    }

    #[test]
    fn test_no_flags_keep_settings() {
        let cli = Cli::try_parse_from(["treemirror", "/src", "/d1"]).unwrap();
        let mut settings = Settings::default();
        settings.mirror.quiescence_ms = 900;
        cli.apply(&mut settings);

        assert_eq!(settings.mirror.quiescence_ms, 900);
        assert!(settings.mirror.prune_removed);
        assert!(settings.mirror.initial_copy);
    }
}
