use std::sync::Mutex;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use senseboard_core::types::name_key;

use crate::db::init_db;
use crate::error::{ProfileError, Result};

/// Cap on stored context lines per member; oldest lines are dropped first.
const MAX_CONTEXT_LINES: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name_key: String,
    pub display_name: String,
    pub context_lines: Vec<String>,
    pub updated_at: String,
}

/// Thread-safe personalization store.
///
/// Wraps a single SQLite connection in a `Mutex`. Lookups are rare (one per
/// personal-board generation) so a Mutex is sufficient; no pool needed.
pub struct ProfileStore {
    db: Mutex<Connection>,
}

impl ProfileStore {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            // Ignore failures here — the subsequent open reports the real error.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Return an existing profile or create an empty one (upsert pattern).
    #[instrument(skip(self), fields(name = %display_name))]
    pub fn get_or_create(&self, display_name: &str) -> Result<Profile> {
        let key = normalized_key(display_name)?;

        if let Some(profile) = self.get(&key)? {
            debug!("profile cache hit");
            return Ok(profile);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO profiles (name_key, display_name, context_lines, updated_at)
             VALUES (?1, ?2, '[]', ?3)",
            rusqlite::params![key, display_name.trim(), now],
        )?;

        // Read back — handles the race where two threads insert simultaneously
        let profile = db.query_row(
            "SELECT name_key, display_name, context_lines, updated_at
             FROM profiles WHERE name_key = ?1",
            rusqlite::params![key],
            row_to_profile,
        )?;
        Ok(profile)
    }

    /// Retrieve a profile by normalized key, returning `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<Profile>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT name_key, display_name, context_lines, updated_at
             FROM profiles WHERE name_key = ?1",
            rusqlite::params![key],
            row_to_profile,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ProfileError::Database(e)),
        }
    }

    /// Append a context line to a member's profile, creating the profile if
    /// needed. Returns the updated profile.
    #[instrument(skip(self, line), fields(name = %display_name))]
    pub fn append(&self, display_name: &str, line: &str) -> Result<Profile> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProfileError::InvalidInput(
                "context line cannot be empty".to_string(),
            ));
        }

        let mut profile = self.get_or_create(display_name)?;
        profile.context_lines.push(line.to_string());
        if profile.context_lines.len() > MAX_CONTEXT_LINES {
            let overflow = profile.context_lines.len() - MAX_CONTEXT_LINES;
            profile.context_lines.drain(..overflow);
        }
        profile.updated_at = chrono::Utc::now().to_rfc3339();

        let lines_json = serde_json::to_string(&profile.context_lines)
            .map_err(|e| ProfileError::InvalidInput(e.to_string()))?;
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE profiles SET context_lines = ?1, updated_at = ?2 WHERE name_key = ?3",
            rusqlite::params![lines_json, profile.updated_at, profile.name_key],
        )?;
        if rows == 0 {
            return Err(ProfileError::NotFound {
                name_key: profile.name_key,
            });
        }
        Ok(profile)
    }
}

fn normalized_key(display_name: &str) -> Result<String> {
    let key = name_key(display_name);
    if key.is_empty() {
        return Err(ProfileError::InvalidInput(
            "display name cannot be empty".to_string(),
        ));
    }
    Ok(key)
}

/// Map a SQLite row to a `Profile`. A malformed JSON column degrades to an
/// empty line list instead of failing the lookup.
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let lines_json: String = row.get(2)?;
    let context_lines: Vec<String> = serde_json::from_str(&lines_json).unwrap_or_default();
    Ok(Profile {
        name_key: row.get(0)?,
        display_name: row.get(1)?,
        context_lines,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_normalizes_the_key() {
        let store = ProfileStore::open_in_memory().unwrap();
        let created = store.get_or_create("  Alex   Chen ").unwrap();
        assert_eq!(created.name_key, "alex chen");
        assert_eq!(created.display_name, "Alex   Chen");
        assert!(created.context_lines.is_empty());

        let again = store.get_or_create("ALEX CHEN").unwrap();
        assert_eq!(again.name_key, created.name_key);
    }

    #[test]
    fn append_accumulates_lines() {
        let store = ProfileStore::open_in_memory().unwrap();
        store.append("sam", "prefers tree diagrams").unwrap();
        let profile = store.append("Sam", "works on the payments team").unwrap();
        assert_eq!(profile.context_lines.len(), 2);
        assert_eq!(profile.context_lines[0], "prefers tree diagrams");
    }

    #[test]
    fn append_rejects_empty_lines() {
        let store = ProfileStore::open_in_memory().unwrap();
        assert!(store.append("sam", "   ").is_err());
    }

    #[test]
    fn append_caps_line_count_from_the_head() {
        let store = ProfileStore::open_in_memory().unwrap();
        for i in 0..(MAX_CONTEXT_LINES + 5) {
            store.append("sam", &format!("line {i}")).unwrap();
        }
        let profile = store.get("sam").unwrap().unwrap();
        assert_eq!(profile.context_lines.len(), MAX_CONTEXT_LINES);
        assert_eq!(profile.context_lines[0], "line 5");
    }

    #[test]
    fn missing_profile_is_none() {
        let store = ProfileStore::open_in_memory().unwrap();
        assert!(store.get("nobody").unwrap().is_none());
    }
}
