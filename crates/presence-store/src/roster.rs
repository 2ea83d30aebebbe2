//! Registered identities (people with a biometric template on file).

use crate::{open_connection, StoreError};
use presence_core::{Identity, RosterError, RosterProvider};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SqliteRoster {
    conn: Connection,
}

impl SqliteRoster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let roster = Self {
            conn: open_connection(path.as_ref())?,
        };
        roster.init_schema()?;
        Ok(roster)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let roster = Self {
            conn: Connection::open_in_memory()?,
        };
        roster.init_schema()?;
        Ok(roster)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS identities (
                external_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                registered_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, external_id FROM identities ORDER BY external_id")?;
        let identities = stmt
            .query_map([], |row| Ok(Identity::new(row.get::<_, String>(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identities)
    }

    pub fn get(&self, external_id: i64) -> Result<Option<Identity>, StoreError> {
        let identity = self
            .conn
            .query_row(
                "SELECT name, external_id FROM identities WHERE external_id = ?1",
                params![external_id],
                |row| Ok(Identity::new(row.get::<_, String>(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(identity)
    }

    /// Insert `identity` unless its id is taken. Returns `false` if it was already present.
    pub fn add(&self, identity: &Identity) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO identities (external_id, name, registered_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO NOTHING",
            params![
                identity.external_id,
                identity.name,
                chrono::Local::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }
}

fn backend(e: StoreError) -> RosterError {
    RosterError::Backend(e.to_string())
}

impl RosterProvider for SqliteRoster {
    fn list_registered_identities(&self) -> Result<Vec<Identity>, RosterError> {
        self.identities().map_err(backend)
    }

    fn find(&self, external_id: i64) -> Result<Option<Identity>, RosterError> {
        self.get(external_id).map_err(backend)
    }

    fn register(&self, identity: &Identity) -> Result<(), RosterError> {
        if self.add(identity).map_err(backend)? {
            tracing::info!(name = %identity.name, external_id = identity.external_id, "identity registered");
            return Ok(());
        }
        match self.get(identity.external_id).map_err(backend)? {
            Some(existing) if existing.name != identity.name => {
                Err(RosterError::Conflict(identity.external_id))
            }
            _ => Ok(()),
        }
    }
}
