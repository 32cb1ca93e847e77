pub mod types;

pub use types::{Message, MessageRole, PLACEHOLDER_TITLE, Thread};

use crate::error::StoreError;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use uuid::Uuid;

type StoreResult<T> = Result<T, StoreError>;

/// Async thread/message persistence contract.
///
/// Multi-step writes (thread + seed message, message + thread touch) are
/// atomic inside the implementation; callers never observe partial
/// application.
pub trait ThreadStore: Send + Sync {
    /// Create a thread with the placeholder title and a seed `system`
    /// message carrying `system_prompt`, both stamped with the same
    /// timestamp.
    fn create_thread<'a>(
        &'a self,
        system_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Thread>> + Send + 'a>>;

    /// All threads, most recently active first.
    fn list_threads<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Vec<Thread>>> + Send + 'a>>;

    /// Messages of a thread in conversational order.
    fn get_messages<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Vec<Message>>> + Send + 'a>>;

    /// Insert a message. Does NOT advance the thread's `updated_at`;
    /// use [`ThreadStore::append_message_and_touch`] when the thread
    /// should surface as recently active.
    fn append_message<'a>(
        &'a self,
        thread_id: &'a str,
        role: MessageRole,
        content: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Message>> + Send + 'a>>;

    /// Insert a message and advance the thread's `updated_at` in one
    /// transaction.
    fn append_message_and_touch<'a>(
        &'a self,
        thread_id: &'a str,
        role: MessageRole,
        content: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Message>> + Send + 'a>>;

    /// Update title and `updated_at` atomically.
    fn set_title_and_touch<'a>(
        &'a self,
        thread_id: &'a str,
        title: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

    /// Advance `updated_at` only.
    fn touch<'a>(
        &'a self,
        thread_id: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

    /// Remove a thread and all its messages as one unit.
    fn delete_thread<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

    fn thread_exists<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>>;

    /// Number of `user`-role messages in a thread; drives the one-shot
    /// title derivation.
    fn count_user_messages<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<u64>> + Send + 'a>>;
}

/// SQLite-backed thread store using a sqlx async pool.
pub struct SqliteThreadStore {
    pool: SqlitePool,
}

fn role_to_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn str_to_role(value: &str) -> StoreResult<MessageRole> {
    match value {
        "system" => Ok(MessageRole::System),
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        other => Err(StoreError::Sqlx(sqlx::Error::Decode(
            format!("unknown message role: {other}").into(),
        ))),
    }
}

fn map_thread_row(row: &SqliteRow) -> StoreResult<Thread> {
    Ok(Thread {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_message_row(row: &SqliteRow) -> StoreResult<Message> {
    let role_raw: String = row.try_get("role")?;
    Ok(Message {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        role: str_to_role(&role_raw)?,
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp")?,
    })
}

impl SqliteThreadStore {
    /// Create a new store with an existing pool and ensure the schema.
    pub async fn new(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS threads (
                 id TEXT PRIMARY KEY,
                 title TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                 role TEXT NOT NULL,
                 content TEXT NOT NULL,
                 timestamp TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread
                 ON messages(thread_id, timestamp)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Open (or create) the database file at `path` and build a store on it.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Sqlx(sqlx::Error::Io(std::io::Error::other(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))))
            })?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await?;

        Self::new(pool).await
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn exists(&self, thread_id: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM threads WHERE id = $1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn require_thread(&self, thread_id: &str) -> StoreResult<()> {
        if self.exists(thread_id).await? {
            Ok(())
        } else {
            Err(StoreError::ThreadNotFound(thread_id.to_string()))
        }
    }
}

impl ThreadStore for SqliteThreadStore {
    fn create_thread<'a>(
        &'a self,
        system_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Thread>> + Send + 'a>> {
        Box::pin(async move {
            let thread_id = Uuid::new_v4().to_string();
            let timestamp = Utc::now().to_rfc3339();

            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO threads (id, title, created_at, updated_at)
                 VALUES ($1, $2, $3, $3)",
            )
            .bind(&thread_id)
            .bind(PLACEHOLDER_TITLE)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO messages (thread_id, role, content, timestamp)
                 VALUES ($1, 'system', $2, $3)",
            )
            .bind(&thread_id)
            .bind(system_prompt)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::debug!(thread_id, "created thread with seed system message");

            Ok(Thread {
                id: thread_id,
                title: PLACEHOLDER_TITLE.to_string(),
                created_at: timestamp.clone(),
                updated_at: timestamp,
            })
        })
    }

    fn list_threads<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Vec<Thread>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, title, created_at, updated_at
                 FROM threads
                 ORDER BY updated_at DESC",
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_thread_row).collect()
        })
    }

    fn get_messages<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Vec<Message>>> + Send + 'a>> {
        Box::pin(async move {
            self.require_thread(thread_id).await?;

            let rows = sqlx::query(
                "SELECT id, thread_id, role, content, timestamp
                 FROM messages
                 WHERE thread_id = $1
                 ORDER BY timestamp ASC, id ASC",
            )
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_message_row).collect()
        })
    }

    fn append_message<'a>(
        &'a self,
        thread_id: &'a str,
        role: MessageRole,
        content: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Message>> + Send + 'a>> {
        Box::pin(async move {
            self.require_thread(thread_id).await?;

            let result = sqlx::query(
                "INSERT INTO messages (thread_id, role, content, timestamp)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(thread_id)
            .bind(role_to_str(role))
            .bind(content)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;

            Ok(Message {
                id: result.last_insert_rowid(),
                thread_id: thread_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: timestamp.to_string(),
            })
        })
    }

    fn append_message_and_touch<'a>(
        &'a self,
        thread_id: &'a str,
        role: MessageRole,
        content: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Message>> + Send + 'a>> {
        Box::pin(async move {
            self.require_thread(thread_id).await?;

            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                "INSERT INTO messages (thread_id, role, content, timestamp)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(thread_id)
            .bind(role_to_str(role))
            .bind(content)
            .bind(timestamp)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE threads SET updated_at = $1 WHERE id = $2")
                .bind(timestamp)
                .bind(thread_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(Message {
                id: result.last_insert_rowid(),
                thread_id: thread_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: timestamp.to_string(),
            })
        })
    }

    fn set_title_and_touch<'a>(
        &'a self,
        thread_id: &'a str,
        title: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE threads
                 SET title = $1, updated_at = $2
                 WHERE id = $3",
            )
            .bind(title)
            .bind(timestamp)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::ThreadNotFound(thread_id.to_string()));
            }
            Ok(())
        })
    }

    fn touch<'a>(
        &'a self,
        thread_id: &'a str,
        timestamp: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE threads SET updated_at = $1 WHERE id = $2")
                .bind(timestamp)
                .bind(thread_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::ThreadNotFound(thread_id.to_string()));
            }
            Ok(())
        })
    }

    fn delete_thread<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            // Messages are removed explicitly so the delete does not depend
            // on the per-connection foreign_keys pragma.
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM messages WHERE thread_id = $1")
                .bind(thread_id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM threads WHERE id = $1")
                .bind(thread_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::ThreadNotFound(thread_id.to_string()));
            }
            tx.commit().await?;

            tracing::debug!(thread_id, "deleted thread and its messages");
            Ok(())
        })
    }

    fn thread_exists<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>> {
        Box::pin(async move { self.exists(thread_id).await })
    }

    fn count_user_messages<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<u64>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT COUNT(*) as cnt FROM messages WHERE thread_id = $1 AND role = 'user'",
            )
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;

            let count: i64 = row.try_get("cnt")?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }
}
