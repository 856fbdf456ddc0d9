mod app;
mod config;
mod database;
mod entities;
mod logging;
mod memo;
mod ports;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::Config,
    database::Database,
    logging::init_tracing,
    services::{
        background::run_rediscovery_loop,
        catalog::CatalogService,
        cursor::CursorStore,
        reconcile::{TrackChangeEvent, Trigger},
        spotify::token::SpotifyTokenStore,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "CHANNEL_MIRROR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. `info` or `channel_mirror=debug`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Export traces to this OTLP (gRPC) endpoint
    #[arg(long, env = "OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the next batch of the rediscovery sweep
    Rediscover,
    /// Keep rediscovering on an interval until interrupted
    Run,
    /// Reconcile freshly inserted tracks from a JSON array of events
    Ingest {
        /// File with the events, `-` for stdin
        #[arg(short, long)]
        events: PathBuf,
    },
    /// Start mirroring a channel
    AddChannel {
        #[arg(long)]
        channel_id: String,
        #[arg(long)]
        name: String,
    },
    /// Record a track seen on a channel and reconcile it if it is new
    Observe {
        #[arg(long)]
        channel_id: String,
        /// Unique key of the track within its channel
        #[arg(long)]
        track: String,
        #[arg(long)]
        name: String,
    },
    #[command(subcommand)]
    Auth(AuthCommands),
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum AuthCommands {
    /// Store a Spotify refresh token for the playlist owner
    SetRefreshToken { refresh_token: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn read_events(path: &Path) -> Result<Vec<TrackChangeEvent>> {
    let contents = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read events from stdin")?
    } else {
        std::fs::read_to_string(path)
            .context(format!("Failed to read events file: {}", path.display()))?
    };
    serde_json::from_str(&contents).context("Events must be a JSON array of track changes")
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(args.otlp_endpoint.as_deref(), &args.log_level)?;

    let result = run(args).await;

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {e}");
        }
    }

    result
}

async fn run(args: Args) -> Result<()> {
    if let Commands::Config(config_commands) = &args.command {
        match config_commands {
            ConfigCommands::CreateDefault => {
                tracing::debug!("Creating default config");
                let path = Config::create_default()?;
                tracing::info!("Default config at: {}", path.display());
            }
            ConfigCommands::Path => match args.config.or_else(Config::config_path) {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        }
        return Ok(());
    }

    let config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load channel-mirror config")?;

    let database = Arc::new(Database::open(&config.database_path()).await?);

    match args.command {
        Commands::Rediscover => {
            let reconciler = app::build_reconciler(database, &config).await?;
            reconciler.handle(Trigger::Rediscover).await?;
        }
        Commands::Run => {
            run_rediscovery_loop(database, config).await?;
        }
        Commands::Ingest { events } => {
            let events = read_events(&events)?;
            let reconciler = app::build_reconciler(database, &config).await?;
            reconciler.handle(Trigger::Events(events)).await?;
        }
        Commands::AddChannel { channel_id, name } => {
            CatalogService::new(database)
                .add_channel(&channel_id, &name)
                .await?;
        }
        Commands::Observe {
            channel_id,
            track,
            name,
        } => {
            let catalog = CatalogService::new(database.clone());
            match catalog.observe_track(&channel_id, &track, &name).await? {
                Some(event) => {
                    let reconciler = app::build_reconciler(database, &config).await?;
                    reconciler.handle(Trigger::Events(vec![event])).await?;
                }
                None => tracing::info!("Track already known, nothing to reconcile"),
            }
        }
        Commands::Auth(AuthCommands::SetRefreshToken { refresh_token }) => {
            SpotifyTokenStore::new(CursorStore::new(database))
                .seed_refresh_token(&refresh_token)
                .await?;
        }
        Commands::Config(_) => {}
    }

    Ok(())
}
