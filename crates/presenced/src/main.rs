use anyhow::{Context, Result};
use presence_core::{InMemoryRoster, NotificationDispatcher};
use presence_store::{SqliteAttendanceStore, SqliteRoster};
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod feed;
mod gate;
mod notify;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");
    let config = Config::from_env();

    let durable_roster = SqliteRoster::open(&config.db_path)
        .with_context(|| format!("opening roster at {}", config.db_path.display()))?;
    let roster = Arc::new(InMemoryRoster::new(durable_roster.identities()?));
    tracing::info!(count = roster.len(), db = %config.db_path.display(), "roster loaded");

    let store = SqliteAttendanceStore::open(&config.db_path)
        .with_context(|| format!("opening attendance store at {}", config.db_path.display()))?;

    let dispatcher = match config
        .tts_command
        .as_deref()
        .and_then(notify::CommandBackend::parse)
    {
        Some(backend) => {
            tracing::info!(program = backend.program(), "speaking notifications");
            NotificationDispatcher::spawn(backend, config.dispatcher_config())
        }
        None => {
            tracing::info!("PRESENCE_TTS_COMMAND unset; notifications go to the log");
            NotificationDispatcher::spawn(notify::LogBackend, config.dispatcher_config())
        }
    };

    let feed: Box<dyn BufRead + Send> = match &config.feed_path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening feed {}", path.display()))?;
            tracing::info!(path = %path.display(), "reading frames from file");
            Box::new(BufReader::new(file))
        }
        None => {
            tracing::info!("reading frames from stdin");
            Box::new(BufReader::new(std::io::stdin()))
        }
    };

    let handle = engine::spawn_engine(
        &config,
        store,
        durable_roster,
        roster.clone(),
        dispatcher.clone(),
        feed,
    )?;

    let _bus = if config.dbus_enabled {
        let recent = dbus_interface::RecentEvents::default();
        tokio::spawn(dbus_interface::record_events(handle.events, recent.clone()));
        let service = dbus_interface::PresenceService::new(recent, roster.clone());
        let connection = dbus_interface::serve(service)
            .await
            .context("registering D-Bus service")?;
        tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus interface registered");
        Some(connection)
    } else {
        drop(handle.events);
        None
    };

    tracing::info!("presenced ready");

    tokio::select! {
        summary = handle.finished => {
            match summary {
                Ok(summary) => tracing::info!(accepted = summary.accepted, "feed finished"),
                Err(_) => tracing::warn!("engine thread exited without a summary"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    tracing::info!("presenced shutting down");
    dispatcher.shutdown();
    dispatcher.join(config.shutdown_grace()).await;

    Ok(())
}
