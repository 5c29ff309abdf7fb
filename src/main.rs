use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

mod app;
mod config;
mod error;
mod feed;
mod jobs;
mod models;
mod server;
mod services;
mod store;

use app::App;
use config::Config;
use error::Result;
use feed::{FeedFetcher, FetchFeed};

#[derive(Debug, Parser)]
#[command(name = "rss2twtxt", version, about = "Republish RSS/Atom feeds as twtxt logs")]
struct Cli {
    /// Path to the config file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP server (default).
    Serve {
        /// Override the configured listen address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Sync one feed, or all of them, once and exit.
    Sync { name: Option<String> },
    /// Rotate oversized logs once and exit.
    Rotate,
    /// Add a feed after checking that it can be fetched.
    Add { name: String, url: String },
    /// Remove a feed from the config. Its log is kept.
    Remove { name: String },
    /// List configured feeds.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let app = Arc::new(App::new(config)?);
            let _jobs = jobs::start(Arc::clone(&app));
            tracing::info!("Started background jobs");
            server::serve(app).await?;
        }

        Command::Sync { name } => {
            let app = App::new(config)?;
            match name {
                Some(name) => {
                    let report = app.sync_feed(&name).await?;
                    println!("{}", report);
                }
                None => {
                    for (name, result) in app.sync_all().await {
                        match result {
                            Ok(report) => println!("{}", report),
                            Err(e) => println!("{}: error: {}", name, e),
                        }
                    }
                }
            }
        }

        Command::Rotate => {
            let app = App::new(config)?;
            for record in app.rotate_all()? {
                println!(
                    "{} ({} bytes) -> {}",
                    record.name,
                    record.size,
                    record.archive.display()
                );
            }
        }

        Command::Add { name, url } => {
            config.add_feed(&name, &url)?;
            let entries = FeedFetcher::new(config.fetch_timeout()).fetch(&url).await?;
            config.save()?;
            println!("Added {} ({} entries)", name, entries.len());
        }

        Command::Remove { name } => {
            config.remove_feed(&name)?;
            config.save()?;
            println!("Removed {}", name);
        }

        Command::List => {
            let app = App::new(config)?;
            for feed in app.feeds() {
                let source = app.config().feeds.get(&feed.name).cloned().unwrap_or_default();
                let updated = feed
                    .last_updated
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}\t{}\t{}\t{}", feed.name, source, feed.url, updated);
            }
        }
    }

    Ok(())
}
