//! Durable session storage port and its backends.
//!
//! Only the credential token and the identity record are durable; everything
//! else in the crate is session-lifetime state.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::api::types::User;

/// Token + identity pair as persisted between runs. The two are stored and
/// cleared together, never one without the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
  pub token: String,
  pub identity: User,
}

/// Storage backend for the persisted session.
pub trait SessionStorage: Send + Sync {
  fn load(&self) -> Result<Option<PersistedSession>>;
  fn save(&self, session: &PersistedSession) -> Result<()>;
  fn clear(&self) -> Result<()>;
}

/// In-memory storage for tests and for running without persistence.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<Option<PersistedSession>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SessionStorage for MemoryStorage {
  fn load(&self) -> Result<Option<PersistedSession>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(inner.clone())
  }

  fn save(&self, session: &PersistedSession) -> Result<()> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *inner = Some(session.clone());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *inner = None;
    Ok(())
  }
}

/// SQLite-backed storage at the default data directory.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Single-row table: the client holds at most one session.
const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    token TEXT NOT NULL,
    identity BLOB NOT NULL,
    saved_at TEXT NOT NULL
);
"#;

impl SqliteStorage {
  /// Open or create the session database at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open session database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shopsync").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session migrations: {}", e))?;

    Ok(())
  }
}

impl SessionStorage for SqliteStorage {
  fn load(&self) -> Result<Option<PersistedSession>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, Vec<u8>)> = conn
      .query_row(
        "SELECT token, identity FROM session WHERE id = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session: {}", e))?;

    match row {
      Some((token, identity)) => {
        let identity: User = serde_json::from_slice(&identity)
          .map_err(|e| eyre!("Failed to deserialize identity: {}", e))?;
        Ok(Some(PersistedSession { token, identity }))
      }
      None => Ok(None),
    }
  }

  fn save(&self, session: &PersistedSession) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let identity = serde_json::to_vec(&session.identity)
      .map_err(|e| eyre!("Failed to serialize identity: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO session (id, token, identity, saved_at) VALUES (0, ?, ?, ?)",
        params![session.token, identity, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to save session: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM session WHERE id = 0", [])
      .map_err(|e| eyre!("Failed to clear session: {}", e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Role;

  fn persisted() -> PersistedSession {
    PersistedSession {
      token: "tok-123".into(),
      identity: User {
        id: 7,
        email: "s@example.com".into(),
        username: "s".into(),
        full_name: "S".into(),
        role: Role::Customer,
        is_active: true,
      },
    }
  }

  #[test]
  fn memory_storage_round_trips() {
    let storage = MemoryStorage::new();
    assert!(storage.load().unwrap().is_none());

    storage.save(&persisted()).unwrap();
    let loaded = storage.load().unwrap().unwrap();
    assert_eq!(loaded.token, "tok-123");
    assert_eq!(loaded.identity.id, 7);

    storage.clear().unwrap();
    assert!(storage.load().unwrap().is_none());
  }

  #[test]
  fn clear_on_empty_storage_is_a_noop() {
    let storage = MemoryStorage::new();
    storage.clear().unwrap();
    assert!(storage.load().unwrap().is_none());
  }
}
