use anyhow::Context;
use clap::Parser;

use treemirror::cli::Cli;
use treemirror::mirror::bootstrap;
use treemirror::{Mirror, Settings, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });
    cli.apply(&mut settings);

    if cli.print_config {
        match settings.to_toml() {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("Error displaying config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    logging::init_with_config(&settings.logging);

    if let Err(e) = run(&cli, &settings).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let source_root = bootstrap::resolve_source(&cli.source).context("invalid source directory")?;
    let destinations = bootstrap::resolve_destinations(&source_root, &cli.destinations)
        .context("invalid destination directory")?;

    treemirror::log_event!("main", "source", "{}", source_root.display());
    for dest in &destinations {
        treemirror::log_event!("main", "destination", "{}", dest.display());
    }

    // Watches go in before the initial copy so nothing changed during it is lost
    let mirror = Mirror::builder()
        .source_root(source_root.clone())
        .destinations(destinations.clone())
        .quiescence_ms(settings.mirror.quiescence_ms)
        .event_buffer(settings.mirror.event_buffer)
        .prune_removed(settings.mirror.prune_removed)
        .build()
        .context("cannot watch source tree")?;

    if settings.mirror.initial_copy {
        tokio::task::spawn_blocking(move || bootstrap::replicate_all(&source_root, &destinations))
            .await
            .context("initial copy task failed")?
            .context("initial copy failed")?;
    }

    mirror.run().await.context("mirroring stopped")?;
    Ok(())
}
