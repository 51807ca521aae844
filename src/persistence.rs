//! Persistence layer for AttendChain
//!
//! The ledger consumes storage only through [`Persistence`]: load a whole
//! collection of one entity kind, or save it back. Every save replaces the
//! collection wholesale. Backends:
//!
//! - [`JsonFileStore`]: one pretty-printed JSON array per kind, replaced
//!   atomically (write a temp file in the same directory, then rename).
//! - [`Database`]: SQLite, each kind replaced inside one transaction.
//! - [`InMemoryPersistence`]: tests and ephemeral runs.

use crate::config::{StorageBackend, StorageConfig};
use crate::entity::{Entity, EntityKind};
use crate::error::{LedgerError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub trait Persistence: Send + Sync {
    fn load(&self, kind: EntityKind) -> Result<Vec<Entity>>;
    fn save(&self, kind: EntityKind, entities: &[Entity]) -> Result<()>;
}

/// Open the backend named by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn Persistence>> {
    let store: Box<dyn Persistence> = match config.backend {
        StorageBackend::Json => Box::new(JsonFileStore::open(&config.path)?),
        StorageBackend::Sqlite => Box::new(Database::open(&config.path)?),
        StorageBackend::Memory => Box::new(InMemoryPersistence::new()),
    };
    info!(backend = ?config.backend, path = %config.path, "opened ledger store");
    Ok(store)
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| LedgerError::Storage(format!("Failed to create data dir {:?}: {}", dir, e)))?;
        Ok(JsonFileStore { dir })
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.collection()))
    }
}

impl Persistence for JsonFileStore {
    fn load(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| LedgerError::Storage(format!("Failed to read {:?}: {}", path, e)))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entities: Vec<Entity> = serde_json::from_str(&text)
            .map_err(|e| LedgerError::Serialization(format!("Failed to parse {:?}: {}", path, e)))?;
        debug!(kind = %kind, count = entities.len(), "loaded collection");
        Ok(entities)
    }

    fn save(&self, kind: EntityKind, entities: &[Entity]) -> Result<()> {
        let path = self.path_for(kind);
        let body = serde_json::to_vec_pretty(entities)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;
        debug!(kind = %kind, count = entities.len(), path = ?path, "saved collection");
        Ok(())
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                position INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            )",
            [],
        )
        .map_err(|e| LedgerError::Storage(format!("Failed to create entities table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

impl Persistence for Database {
    fn load(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT body FROM entities WHERE kind = ?1 ORDER BY position ASC")
            .map_err(|e| LedgerError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![kind.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| LedgerError::Storage(format!("Failed to query {}: {}", kind.collection(), e)))?;

        let mut entities = Vec::new();
        for row in rows {
            let body = row.map_err(|e| LedgerError::Storage(format!("Failed to read row: {}", e)))?;
            let entity: Entity = serde_json::from_str(&body)
                .map_err(|e| LedgerError::Serialization(format!("Failed to deserialize {}: {}", kind, e)))?;
            entities.push(entity);
        }
        Ok(entities)
    }

    fn save(&self, kind: EntityKind, entities: &[Entity]) -> Result<()> {
        // Replace the whole collection atomically.
        let conn = self.conn.lock();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| LedgerError::Storage(format!("Failed to start transaction: {}", e)))?;

        tx.execute("DELETE FROM entities WHERE kind = ?1", params![kind.as_str()])
            .map_err(|e| LedgerError::Storage(format!("Failed to clear {}: {}", kind.collection(), e)))?;

        for (position, entity) in entities.iter().enumerate() {
            let body = serde_json::to_string(entity)?;
            tx.execute(
                "INSERT INTO entities (kind, id, position, body) VALUES (?1, ?2, ?3, ?4)",
                params![kind.as_str(), entity.id, position as i64, body],
            )
            .map_err(|e| LedgerError::Storage(format!("Failed to save {} {}: {}", kind, entity.id, e)))?;
        }

        tx.commit()
            .map_err(|e| LedgerError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    collections: Arc<Mutex<HashMap<EntityKind, Vec<Entity>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn load(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        Ok(self.collections.lock().get(&kind).cloned().unwrap_or_default())
    }

    fn save(&self, kind: EntityKind, entities: &[Entity]) -> Result<()> {
        self.collections.lock().insert(kind, entities.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Chain, ROOT_SENTINEL};
    use tempfile::TempDir;

    fn department(id: &str, name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            kind: EntityKind::Department,
            name: name.to_string(),
            roll_no: None,
            parent_id: None,
            deleted: false,
            anchor: None,
            chain: Chain::genesis(name, ROOT_SENTINEL, 0),
        }
    }

    fn exercise(store: &dyn Persistence) {
        assert!(store.load(EntityKind::Department).unwrap().is_empty());

        let saved = vec![department("d1", "Physics"), department("d2", "Maths")];
        store.save(EntityKind::Department, &saved).unwrap();
        assert_eq!(store.load(EntityKind::Department).unwrap(), saved);
        assert!(store.load(EntityKind::Class).unwrap().is_empty());

        // A save replaces, never merges.
        store.save(EntityKind::Department, &saved[1..]).unwrap();
        let loaded = store.load(EntityKind::Department).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "d2");
    }

    #[test]
    fn test_in_memory_store() {
        exercise(&InMemoryPersistence::new());
    }

    #[test]
    fn test_sqlite_store() {
        exercise(&Database::in_memory().unwrap());
    }

    #[test]
    fn test_json_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        exercise(&store);
        assert!(store.path_for(EntityKind::Department).exists());
        // Only the collection file remains; the temp file was renamed over it.
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_json_store_reports_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for(EntityKind::Student), "{not json").unwrap();
        assert!(matches!(store.load(EntityKind::Student), Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn test_open_store_picks_backend() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: dir.path().join("ledger.db").to_string_lossy().into_owned(),
        };
        let store = open_store(&config).unwrap();
        store.save(EntityKind::Department, &[department("d1", "Physics")]).unwrap();
        assert_eq!(store.load(EntityKind::Department).unwrap().len(), 1);
    }
}
