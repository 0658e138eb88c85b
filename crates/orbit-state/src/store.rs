use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::{
    db::init_db,
    error::{Result, StateError},
    types::DurableState,
};

/// A single opaque durable slot.
pub trait StateStore: Send + Sync {
    /// Load the whole record; a store that was never written yields the default.
    fn load(&self) -> Result<DurableState>;

    /// Replace the whole record.
    fn save(&self, state: &DurableState) -> Result<()>;

    /// Read the pending reveal and clear it in one step.
    ///
    /// The clear is committed before the caller delivers anything, so a crash
    /// can lose a reveal but never deliver it twice.
    fn take_pending(&self) -> Result<Option<String>> {
        let mut state = self.load()?;
        let pending = state.pending_diagnosis.take();
        if pending.is_some() {
            self.save(&state)?;
        }
        Ok(pending)
    }
}

/// SQLite-backed store (one row in `orbit_state`).
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file, creating its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "opening state database");
        Self::new(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::Poisoned)
    }
}

fn read_state(conn: &Connection) -> Result<DurableState> {
    let row = conn
        .query_row(
            "SELECT pending_diagnosis, updated_at FROM orbit_state WHERE id = 1",
            [],
            |row| {
                Ok(DurableState {
                    pending_diagnosis: row.get::<_, Option<String>>(0)?,
                    updated_at: Some(row.get::<_, String>(1)?),
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_default())
}

fn write_state(conn: &Connection, pending: Option<&str>) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO orbit_state (id, pending_diagnosis, updated_at)
         VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET
            pending_diagnosis = excluded.pending_diagnosis,
            updated_at        = excluded.updated_at",
        rusqlite::params![pending, now],
    )?;
    Ok(())
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<DurableState> {
        let conn = self.lock()?;
        read_state(&conn)
    }

    fn save(&self, state: &DurableState) -> Result<()> {
        let conn = self.lock()?;
        write_state(&conn, state.pending_diagnosis.as_deref())?;
        debug!(pending = state.has_pending(), "state saved");
        Ok(())
    }

    fn take_pending(&self) -> Result<Option<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let pending = read_state(&tx)?.pending_diagnosis;
        if pending.is_some() {
            write_state(&tx, None)?;
        }
        tx.commit()?;
        if pending.is_some() {
            info!("pending reveal taken and cleared");
        }
        Ok(pending)
    }
}
