use rusqlite::{Connection, Result};

/// Initialise the profiles table. Safe to call on every startup —
/// CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS profiles (
            name_key      TEXT PRIMARY KEY NOT NULL,
            display_name  TEXT NOT NULL,
            context_lines TEXT NOT NULL DEFAULT '[]',  -- JSON array
            updated_at    TEXT NOT NULL
        );",
    )
}
