use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use world::{Character, CharacterStore, PlayerId, StoreError};

use crate::error::PlayerDbError;
use crate::schema;

/// SQLite-backed character documents, one row per lower-cased name.
pub struct PlayerDb {
    conn: Mutex<Connection>,
}

impl PlayerDb {
    /// Open (or create) a database at the given file path.
    pub fn open(path: &str) -> Result<Self, PlayerDbError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::create_tables(&conn)?;
        tracing::info!(%path, "player database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, PlayerDbError> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn load(&self, id: &PlayerId) -> Result<Option<Character>, PlayerDbError> {
        let document: Option<String> = self
            .conn()
            .query_row(
                "SELECT document FROM characters WHERE id = ?1",
                rusqlite::params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        document
            .map(|doc| {
                serde_json::from_str(&doc).map_err(|source| PlayerDbError::Corrupt {
                    id: id.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Insert or replace the character's document.
    pub fn store(&self, id: &PlayerId, character: &Character) -> Result<(), PlayerDbError> {
        let document = serde_json::to_string(character).map_err(|source| PlayerDbError::Corrupt {
            id: id.to_string(),
            source,
        })?;
        self.conn().execute(
            "INSERT INTO characters (id, name, document) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                document = excluded.document,
                last_saved = datetime('now')",
            rusqlite::params![id.as_str(), character.name, document],
        )?;
        tracing::debug!(player = %id, "character saved");
        Ok(())
    }

    pub fn exists(&self, id: &PlayerId) -> Result<bool, PlayerDbError> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM characters WHERE id = ?1",
                rusqlite::params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn count(&self) -> Result<usize, PlayerDbError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM characters", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl CharacterStore for PlayerDb {
    fn get(&self, id: &PlayerId) -> Result<Option<Character>, StoreError> {
        Ok(self.load(id)?)
    }

    fn save(&self, id: &PlayerId, character: &Character) -> Result<(), StoreError> {
        Ok(self.store(id, character)?)
    }
}
