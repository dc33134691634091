//! SQLite-backed document store, a durable stand-in for the hosted database.

use std::path::Path;

use rusqlite::{Connection, params};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{DocumentSnapshot, DocumentStore, RemoteResult, SnapshotReceiver};

/// SQLite implementation of [`crate::remote::DocumentStore`].
///
/// Documents live in a single `books` table keyed by document key. Upserts
/// keep the original rowid, so [`DocumentStore::fetch_all`] returns documents
/// in first-insert order.
pub struct SqliteDocumentStore {
    conn: Connection,
    subscribers: Vec<mpsc::UnboundedSender<DocumentSnapshot>>,
}

impl SqliteDocumentStore {
    /// Opens or creates a document store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> RemoteResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory document store.
    pub fn open_in_memory() -> RemoteResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> RemoteResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            subscribers: Vec::new(),
        })
    }

    fn snapshot(&self) -> RemoteResult<DocumentSnapshot> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, payload FROM books ORDER BY rowid ASC")?;

        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let payload: String = row.get(1)?;
            Ok((key, payload))
        })?;

        let mut out = DocumentSnapshot::new();
        for row in rows {
            let (key, payload) = row?;
            out.push((key, serde_json::from_str(&payload)?));
        }
        Ok(out)
    }

    fn notify(&mut self) -> RemoteResult<()> {
        if self.subscribers.is_empty() {
            return Ok(());
        }
        let snapshot = self.snapshot()?;
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        Ok(())
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn put(&mut self, key: &str, document: &Value) -> RemoteResult<()> {
        let payload = serde_json::to_string(document)?;
        self.conn.execute(
            "INSERT INTO books(key, payload) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload",
            params![key, payload],
        )?;
        self.notify()
    }

    fn delete(&mut self, key: &str) -> RemoteResult<()> {
        self.conn
            .execute("DELETE FROM books WHERE key = ?1", params![key])?;
        self.notify()
    }

    fn fetch_all(&mut self) -> RemoteResult<DocumentSnapshot> {
        self.snapshot()
    }

    fn subscribe(&mut self) -> RemoteResult<SnapshotReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.snapshot()?);
        self.subscribers.push(tx);
        Ok(rx)
    }
}
