use presence_core::{AssociationConfig, DispatcherConfig, EngineConfig, OverflowPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// SQLite database holding attendance records and the roster.
    pub db_path: PathBuf,
    /// JSON-lines frame feed; `None` reads stdin.
    pub feed_path: Option<PathBuf>,
    /// Minimum gap between two events of one person (default: 60).
    pub min_entry_gap_secs: u64,
    /// Unknown sightings of one track before manual authorization (default: 5).
    pub max_unknown_attempts: u32,
    /// Escalation counters are cleared every N processed frames (default: 150).
    pub sweep_interval_frames: u64,
    /// Process every Nth frame of the feed (default: 1).
    pub frame_stride: u64,
    /// Maximum queued notifications before the oldest is dropped.
    pub notify_capacity: usize,
    /// Upper bound on one text-to-speech call.
    pub notify_timeout_secs: u64,
    /// Command used to speak notifications, e.g. `espeak -s 150`. Unset logs them instead.
    pub tts_command: Option<String>,
    /// Terminal used for manual authorization prompts.
    pub tty_path: PathBuf,
    /// Whether to expose status and recent events on the session bus.
    pub dbus_enabled: bool,
    /// Minimum box overlap for two detections to share a track.
    pub iou_threshold: f32,
    /// Tracks unseen for this long are forgotten.
    pub track_max_age_ms: i64,
    /// How long shutdown waits for queued notifications.
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("PRESENCE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| presence_store::default_db_path());

        let feed_path = std::env::var("PRESENCE_FEED")
            .ok()
            .filter(|p| !p.is_empty() && p != "-")
            .map(PathBuf::from);

        Self {
            db_path,
            feed_path,
            min_entry_gap_secs: env_u64("PRESENCE_MIN_ENTRY_GAP_SECS", 60),
            max_unknown_attempts: env_u32("PRESENCE_MAX_UNKNOWN_ATTEMPTS", 5),
            sweep_interval_frames: env_u64("PRESENCE_SWEEP_INTERVAL_FRAMES", 150),
            frame_stride: env_u64("PRESENCE_FRAME_STRIDE", 1),
            notify_capacity: env_usize("PRESENCE_NOTIFY_CAPACITY", 32),
            notify_timeout_secs: env_u64("PRESENCE_NOTIFY_TIMEOUT_SECS", 5),
            tts_command: std::env::var("PRESENCE_TTS_COMMAND")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            tty_path: std::env::var("PRESENCE_TTY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/dev/tty")),
            dbus_enabled: std::env::var("PRESENCE_DBUS_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(false),
            iou_threshold: env_f32("PRESENCE_IOU_THRESHOLD", 0.3),
            track_max_age_ms: env_u64("PRESENCE_TRACK_MAX_AGE_MS", 1_500) as i64,
            shutdown_grace_secs: env_u64("PRESENCE_SHUTDOWN_GRACE_SECS", 10),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            min_entry_gap_ms: self.min_entry_gap_secs.saturating_mul(1_000),
            max_unknown_attempts: self.max_unknown_attempts,
            sweep_interval_frames: self.sweep_interval_frames,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            capacity: self.notify_capacity,
            overflow: OverflowPolicy::DropOldest,
            backend_timeout_ms: self.notify_timeout_secs.saturating_mul(1_000),
        }
    }

    pub fn association_config(&self) -> AssociationConfig {
        AssociationConfig {
            iou_threshold: self.iou_threshold,
            max_track_age_ms: self.track_max_age_ms,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
