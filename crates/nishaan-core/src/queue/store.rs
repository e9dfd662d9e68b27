//! Durable queue storage trait and SQLite implementation.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::models::QueuedOperation;

use super::QueueError;

/// Trait for queue storage backends.
///
/// Ordering is by `timestamp`, ties broken by insertion order. Each call
/// is atomic on its own; sequences of calls are not.
pub trait QueueStore: Send + Sync {
    /// Insert a new operation. Fails if the id already exists.
    fn add(&self, operation: &QueuedOperation) -> Result<(), QueueError>;

    /// All operations, oldest first.
    fn get_all_ordered_by_timestamp(&self) -> Result<Vec<QueuedOperation>, QueueError>;

    /// Delete by id. Deleting an absent id is not an error.
    fn remove(&self, id: &str) -> Result<(), QueueError>;

    /// Insert or replace by id, keeping the original insertion position.
    fn put(&self, operation: &QueuedOperation) -> Result<(), QueueError>;

    fn clear(&self) -> Result<(), QueueError>;

    fn size(&self) -> Result<usize, QueueError>;
}

// ============================================================================
// SQLite
// ============================================================================

/// Schema for the queue table.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    op_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp
    ON sync_queue(timestamp, seq);
"#;

/// SQLite-backed queue store.
///
/// Open one per process and share it behind an `Arc`; the connection is
/// kept for the lifetime of the store.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened queue database");
        Self::with_connection(conn)
    }

    /// Open the queue database under the configured data directory.
    pub fn open_default(config: &Config) -> anyhow::Result<Self> {
        let path = config.queue_db_path()?;
        Self::open(&path)
            .with_context(|| format!("Failed to open queue database: {}", path.display()))
    }

    /// Queue that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, QueueError> {
        conn.execute_batch(QUEUE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, QueueError> {
        self.conn.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

impl QueueStore for SqliteQueueStore {
    fn add(&self, operation: &QueuedOperation) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let payload = serde_json::to_string(&operation.payload)?;

        conn.execute(
            "INSERT INTO sync_queue (id, op_type, payload, timestamp, retries)
             VALUES (?, ?, ?, ?, ?)",
            params![
                operation.id,
                operation.op_type,
                payload,
                operation.timestamp,
                operation.retries
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                QueueError::Duplicate(operation.id.clone())
            }
            other => QueueError::Storage(other),
        })?;

        Ok(())
    }

    fn get_all_ordered_by_timestamp(&self) -> Result<Vec<QueuedOperation>, QueueError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, op_type, payload, timestamp, retries FROM sync_queue
             ORDER BY timestamp, seq",
        )?;

        let rows = stmt.query_map([], |row| {
            let raw_payload: String = row.get(2)?;
            Ok(QueuedOperation {
                id: row.get(0)?,
                op_type: row.get(1)?,
                // Undecodable payloads are kept verbatim so replay can report them
                payload: serde_json::from_str(&raw_payload)
                    .unwrap_or(Value::String(raw_payload)),
                timestamp: row.get(3)?,
                retries: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(QueueError::from)
    }

    fn remove(&self, id: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sync_queue WHERE id = ?", params![id])?;
        Ok(())
    }

    fn put(&self, operation: &QueuedOperation) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let payload = serde_json::to_string(&operation.payload)?;

        conn.execute(
            "INSERT INTO sync_queue (id, op_type, payload, timestamp, retries)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                op_type = excluded.op_type,
                payload = excluded.payload,
                timestamp = excluded.timestamp,
                retries = excluded.retries",
            params![
                operation.id,
                operation.op_type,
                payload,
                operation.timestamp,
                operation.retries
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sync_queue", [])?;
        Ok(())
    }

    fn size(&self) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryQueue {
    next_seq: u64,
    entries: Vec<(u64, QueuedOperation)>,
}

/// Queue store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<MemoryQueue>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryQueue>, QueueError> {
        self.inner.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

impl QueueStore for MemoryQueueStore {
    fn add(&self, operation: &QueuedOperation) -> Result<(), QueueError> {
        let mut queue = self.lock()?;
        if queue.entries.iter().any(|(_, op)| op.id == operation.id) {
            return Err(QueueError::Duplicate(operation.id.clone()));
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push((seq, operation.clone()));
        Ok(())
    }

    fn get_all_ordered_by_timestamp(&self) -> Result<Vec<QueuedOperation>, QueueError> {
        let queue = self.lock()?;
        let mut entries = queue.entries.clone();
        entries.sort_by_key(|(seq, op)| (op.timestamp, *seq));
        Ok(entries.into_iter().map(|(_, op)| op).collect())
    }

    fn remove(&self, id: &str) -> Result<(), QueueError> {
        self.lock()?.entries.retain(|(_, op)| op.id != id);
        Ok(())
    }

    fn put(&self, operation: &QueuedOperation) -> Result<(), QueueError> {
        let mut queue = self.lock()?;
        if let Some((_, existing)) = queue
            .entries
            .iter_mut()
            .find(|(_, op)| op.id == operation.id)
        {
            *existing = operation.clone();
            return Ok(());
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push((seq, operation.clone()));
        Ok(())
    }

    fn clear(&self) -> Result<(), QueueError> {
        self.lock()?.entries.clear();
        Ok(())
    }

    fn size(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.entries.len())
    }
}
