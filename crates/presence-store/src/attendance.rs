//! Attendance records, one row per accepted presence event.
//!
//! Rows keep the original record layout (name, roll number, attendance flag,
//! date, time of attendance) plus the event type and how the person was
//! identified.

use crate::{open_connection, StoreError};
use chrono::NaiveDate;
use presence_core::{AttendanceStore, EventType, Method, PersistenceError, PresenceEvent};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

const SELECT_COLUMNS: &str =
    "SELECT id, name, roll_number, attendance, event_type, method, date, time, timestamp_ms
     FROM attendance";

/// A stored attendance row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub name: String,
    pub roll_number: i64,
    pub attendance: bool,
    pub event_type: EventType,
    pub method: Method,
    pub date: String,
    pub time: String,
    pub timestamp_ms: i64,
}

pub struct SqliteAttendanceStore {
    conn: Connection,
}

impl SqliteAttendanceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self {
            conn: open_connection(path)?,
        };
        store.init_schema()?;
        tracing::debug!(path = %path.display(), "attendance store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS attendance (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                roll_number INTEGER NOT NULL,
                attendance INTEGER NOT NULL DEFAULT 1,
                event_type TEXT NOT NULL,
                method TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date, timestamp_ms)",
            [],
        )?;
        Ok(())
    }

    /// Insert one event. Event ids are unique, so a duplicate insert fails.
    pub fn record(&self, event: &PresenceEvent) -> Result<(), StoreError> {
        let local = event.local_time();
        self.conn.execute(
            "INSERT INTO attendance
             (id, name, roll_number, attendance, event_type, method, date, time, timestamp_ms)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.to_string(),
                event.identity.name,
                event.roll_number,
                event.event_type.as_str(),
                event.method.as_str(),
                local.format(DATE_FORMAT).to_string(),
                local.format(TIME_FORMAT).to_string(),
                event.timestamp_ms,
            ],
        )?;
        Ok(())
    }

    /// All rows for one calendar date, oldest first.
    pub fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE date = ?1 ORDER BY timestamp_ms, rowid");
        self.query(&sql, params![date.format(DATE_FORMAT).to_string()])
    }

    /// Every row, oldest first.
    pub fn all_records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY timestamp_ms, rowid");
        self.query(&sql, [])
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Write every row as one JSON object per line. Returns the row count.
    pub fn export_json_lines<W: Write>(&self, mut out: W) -> Result<usize, StoreError> {
        let records = self.all_records()?;
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(records.len())
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRow::into_record).collect()
    }
}

impl AttendanceStore for SqliteAttendanceStore {
    fn insert(&mut self, event: &PresenceEvent) -> Result<(), PersistenceError> {
        self.record(event)
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))
    }
}

/// Row as read from SQLite, before enum columns are validated.
struct RawRow {
    id: String,
    name: String,
    roll_number: i64,
    attendance: bool,
    event_type: String,
    method: String,
    date: String,
    time: String,
    timestamp_ms: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            roll_number: row.get(2)?,
            attendance: row.get(3)?,
            event_type: row.get(4)?,
            method: row.get(5)?,
            date: row.get(6)?,
            time: row.get(7)?,
            timestamp_ms: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<AttendanceRecord, StoreError> {
        let event_type = self
            .event_type
            .parse::<EventType>()
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.id)))?;
        let method = self
            .method
            .parse::<Method>()
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.id)))?;
        Ok(AttendanceRecord {
            id: self.id,
            name: self.name,
            roll_number: self.roll_number,
            attendance: self.attendance,
            event_type,
            method,
            date: self.date,
            time: self.time,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use presence_core::Identity;

    fn event(name: &str, roll: i64, event_type: EventType, at_ms: i64) -> PresenceEvent {
        PresenceEvent::new(
            Identity::new(name, roll),
            roll,
            event_type,
            Method::Recognition,
            at_ms,
        )
    }

    fn local_ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_record_and_read_back() {
        let store = SqliteAttendanceStore::open_in_memory().unwrap();
        let at = local_ms(2024, 3, 5, 18, 30);
        let e = event("Dev Mishra", 22053596, EventType::Entry, at);
        store.record(&e).unwrap();

        let rows = store.all_records().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, e.id.to_string());
        assert_eq!(row.name, "Dev Mishra");
        assert_eq!(row.roll_number, 22053596);
        assert!(row.attendance);
        assert_eq!(row.event_type, EventType::Entry);
        assert_eq!(row.method, Method::Recognition);
        assert_eq!(row.date, "2024-03-05");
        assert_eq!(row.time, "18:30");
    }

    #[test]
    fn test_records_on_filters_by_date() {
        let store = SqliteAttendanceStore::open_in_memory().unwrap();
        store
            .record(&event("A", 1, EventType::Entry, local_ms(2024, 3, 5, 9, 0)))
            .unwrap();
        store
            .record(&event("A", 1, EventType::Exit, local_ms(2024, 3, 5, 17, 0)))
            .unwrap();
        store
            .record(&event("A", 1, EventType::Entry, local_ms(2024, 3, 6, 9, 0)))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let rows = store.records_on(day).unwrap();
        let types: Vec<EventType> = rows.iter().map(|r| r.event_type).collect();
        assert_eq!(types, vec![EventType::Entry, EventType::Exit]);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_duplicate_event_rejected_through_trait() {
        let mut store = SqliteAttendanceStore::open_in_memory().unwrap();
        let e = event("A", 1, EventType::Entry, 0);
        assert!(store.insert(&e).is_ok());
        let err = store.insert(&e).unwrap_err();
        assert!(matches!(err, PersistenceError::WriteFailed(_)));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_export_json_lines() {
        let store = SqliteAttendanceStore::open_in_memory().unwrap();
        store.record(&event("A", 1, EventType::Entry, 1_000)).unwrap();
        store.record(&event("B", 2, EventType::Entry, 2_000)).unwrap();

        let mut out = Vec::new();
        assert_eq!(store.export_json_lines(&mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "A");
        assert_eq!(lines[1]["roll_number"], 2);
        assert_eq!(lines[1]["event_type"], "Entry");
    }

    #[test]
    fn test_corrupt_event_type_is_reported() {
        let store = SqliteAttendanceStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO attendance
                 (id, name, roll_number, event_type, method, date, time, timestamp_ms)
                 VALUES ('x', 'A', 1, 'Sideways', 'Recognition', '2024-01-01', '00:00', 0)",
                [],
            )
            .unwrap();
        assert!(matches!(store.all_records(), Err(StoreError::Corrupt(_))));
    }
}
