//! Document store boundary
//!
//! The core only needs to load a user document by id and write it back.
//! `SqliteStore` keeps one JSON document per user; `InMemoryStore` backs
//! tests and embedders that bring their own persistence.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::error::StoreError;
use crate::models::User;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, StoreError>;

    /// Write the whole user document, creating it if absent
    async fn update(&self, user: &User) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

/// SQLite-backed store, one JSON document per user
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                    reason: format!("cannot create {}: {}", parent.display(), e),
                })?;
            }
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // WAL allows readers while the finish worker writes
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                document TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// List (id, username) of all stored users
    pub async fn list_users(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, username FROM users ORDER BY username")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Backend {
                reason: "connection lock poisoned".to_string(),
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend {
            reason: format!("store task failed: {}", e),
        })?
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        let id = user_id.to_string();
        let document: Option<String> = self
            .with_connection(move |conn| {
                Ok(conn
                    .query_row("SELECT document FROM users WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;

        match document {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::UserNotFound {
                user_id: user_id.to_string(),
            }),
        }
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let document = serde_json::to_string(user)?;
        let id = user.id.clone();
        let username = user.username.clone();

        self.with_connection(move |conn| {
            conn.execute(
                r#"
                INSERT INTO users (id, username, document, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    document = excluded.document,
                    updated_at = excluded.updated_at
                "#,
                params![id, username, document, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }
}

/// Per-user write lock around read-modify-write cycles on a user document
///
/// Only users whose lock is held or awaited keep an entry; idle entries are
/// pruned on the next `lock` call.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // guards and waiters hold a clone, so a count of one means idle
            locks.retain(|id, lock| id == user_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of users with a lock entry
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrainingPlan;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        let user = User::new("lifter");

        assert!(matches!(
            store.find_user_by_id(&user.id).await,
            Err(StoreError::UserNotFound { .. })
        ));

        store.update(&user).await.unwrap();
        assert_eq!(store.find_user_by_id(&user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_documents() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("data").join("liftrs.db");

        let mut user = User::new("lifter");
        user.training_plans.push(TrainingPlan::new("Block 1", 3, 4));

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.update(&user).await.unwrap();

            user.username = "renamed".to_string();
            store.update(&user).await.unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let loaded = store.find_user_by_id(&user.id).await.unwrap();
        assert_eq!(loaded, user);
        assert_eq!(store.list_users().await.unwrap(), vec![(user.id.clone(), "renamed".to_string())]);
    }

    #[tokio::test]
    async fn test_user_locks_serialize_same_user() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.lock("a").await;

        // another user is not blocked
        let _other = locks.lock("b").await;

        let contended = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("a").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }

    #[tokio::test]
    async fn test_user_locks_prune_idle_entries() {
        let locks = UserLocks::new();
        for i in 0..100 {
            let _guard = locks.lock(&format!("user-{}", i)).await;
        }
        assert_eq!(locks.len(), 1);

        let held = locks.lock("a").await;
        let other = locks.lock("b").await;
        assert_eq!(locks.len(), 2);

        drop(held);
        drop(other);
        let _guard = locks.lock("c").await;
        assert_eq!(locks.len(), 1);
    }
}
