use rusqlite::Connection;

use crate::error::Result;

/// Initialise the state schema in `conn`.
///
/// Creates the single-row `orbit_state` table (idempotent). The `CHECK`
/// constraint pins the table to one slot, so saves are plain upserts.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS orbit_state (
            id                INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
            pending_diagnosis TEXT,               -- NULL when no reveal is parked
            updated_at        TEXT    NOT NULL    -- ISO-8601
        ) STRICT;
        ",
    )?;
    Ok(())
}
