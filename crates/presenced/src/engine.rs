use crate::config::Config;
use crate::feed::{FeedFrame, RosterResolver};
use crate::gate::ConsoleGate;
use presence_core::{
    Evaluation, FrameOutcome, FramePipeline, InMemoryRoster, IouTrackAssociator, Method,
    NotificationDispatcher, PresenceEngine, PresenceEvent, RosterProvider,
};
use presence_store::{SqliteAttendanceStore, SqliteRoster};
use std::io::BufRead;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

#[derive(Error, Debug)]
pub enum EngineThreadError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Totals reported when the feed is exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedSummary {
    pub lines: u64,
    pub malformed: u64,
    pub accepted: u64,
    pub store_failures: u64,
}

/// Handle to the engine thread.
pub struct EngineHandle {
    /// Accepted events in order.
    pub events: broadcast::Receiver<PresenceEvent>,
    /// Resolves when the feed ends.
    pub finished: oneshot::Receiver<FeedSummary>,
}

type DaemonEngine =
    PresenceEngine<SqliteAttendanceStore, ConsoleGate<InMemoryRoster>, NotificationDispatcher>;

/// Spawn the presence engine on a dedicated OS thread.
///
/// The thread owns the engine and every piece of presence state; it reads
/// the feed one frame at a time until end of input.
pub fn spawn_engine(
    config: &Config,
    store: SqliteAttendanceStore,
    durable_roster: SqliteRoster,
    roster: Arc<InMemoryRoster>,
    dispatcher: NotificationDispatcher,
    feed: Box<dyn BufRead + Send>,
) -> Result<EngineHandle, EngineThreadError> {
    let gate = ConsoleGate::new(roster.clone(), config.tty_path.clone());
    let mut engine = PresenceEngine::new(config.engine_config(), store, gate, dispatcher);
    let events = engine.subscribe();

    let mut pipeline = FramePipeline::new(
        RosterResolver::new(roster.clone()),
        IouTrackAssociator::new(config.association_config()),
        config.frame_stride,
    );

    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let summary = run_feed(&mut engine, &mut pipeline, &durable_roster, &roster, feed);
            tracing::info!(
                lines = summary.lines,
                malformed = summary.malformed,
                accepted = summary.accepted,
                store_failures = summary.store_failures,
                "feed exhausted"
            );
            let _ = done_tx.send(summary);
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle {
        events,
        finished: done_rx,
    })
}

fn run_feed(
    engine: &mut DaemonEngine,
    pipeline: &mut FramePipeline<RosterResolver<InMemoryRoster>, IouTrackAssociator>,
    durable_roster: &SqliteRoster,
    roster: &InMemoryRoster,
    feed: Box<dyn BufRead + Send>,
) -> FeedSummary {
    let mut summary = FeedSummary::default();

    for line in feed.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "feed read failed; stopping");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let frame = match FeedFrame::parse(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, line = summary.lines, "frame skipped");
                summary.malformed += 1;
                continue;
            }
        };
        let timestamp_ms = frame
            .timestamp_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let FrameOutcome::Evaluated(outcomes) = pipeline.process(engine, &frame, timestamp_ms) else {
            continue;
        };

        for outcome in outcomes {
            match outcome {
                Ok(Evaluation::Accepted(event)) => {
                    summary.accepted += 1;
                    if event.method == Method::ManualId {
                        register_authorized(durable_roster, roster, &event);
                    }
                }
                Ok(evaluation @ Evaluation::CoolingDown { .. }) => {
                    if let Some(advisory) = evaluation.advisory() {
                        tracing::info!(advisory = %advisory, "cooldown");
                    }
                }
                Ok(_) => {}
                Err(_) => summary.store_failures += 1,
            }
        }
    }

    summary
}

/// Add a manually authorized person to both rosters. Best effort: the
/// attendance event is already recorded either way.
fn register_authorized(durable: &SqliteRoster, roster: &InMemoryRoster, event: &PresenceEvent) {
    if let Err(e) = durable.register(&event.identity) {
        tracing::warn!(error = %e, name = %event.identity.name, "roster registration failed");
        return;
    }
    if let Err(e) = roster.register(&event.identity) {
        tracing::warn!(error = %e, name = %event.identity.name, "in-memory roster update failed");
    }
}
