//! presence-store — SQLite persistence for attendance records and the roster.
//!
//! Both tables may live in the same database file; each type opens its own
//! connection so the engine thread and the CLI can use them independently.

pub mod attendance;
pub mod roster;

pub use attendance::{AttendanceRecord, SqliteAttendanceStore};
pub use roster::SqliteRoster;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Default database location: `$XDG_DATA_HOME/presence/attendance.db`.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence")
        .join("attendance.db")
}

/// Open a connection, creating parent directories for file-backed databases.
fn open_connection(path: &std::path::Path) -> Result<rusqlite::Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;",
    )?;
    Ok(conn)
}
