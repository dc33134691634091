pub mod memory;
pub mod sqlite;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{BookId, DocKey, WriteSeq};

/// Name of the remote collection holding book documents.
pub const COLLECTION: &str = "books";

/// Full-collection snapshot as `(document key, document body)` pairs in
/// server order.
pub type DocumentSnapshot = Vec<(DocKey, Value)>;

/// Receiver half of a snapshot subscription.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<DocumentSnapshot>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Point mutation addressed to a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Create or replace the document body.
    Put {
        /// Serialized wire fields.
        document: Value,
    },
    /// Delete the document. Deleting an absent document succeeds.
    Delete,
}

/// Discriminant of a [`WriteOp`], carried in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Create-or-replace write.
    Put,
    /// Document removal.
    Delete,
}

/// One remote write staged by the store, matched back to it by `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Monotonic write sequence.
    pub seq: WriteSeq,
    /// Book whose document is addressed.
    pub id: BookId,
    /// Mutation to execute.
    pub op: WriteOp,
}

impl WriteRequest {
    /// Document key addressed by this write.
    pub fn doc_key(&self) -> DocKey {
        self.id.to_string()
    }

    /// Collapses the op to its kind.
    pub fn kind(&self) -> WriteKind {
        match self.op {
            WriteOp::Put { .. } => WriteKind::Put,
            WriteOp::Delete => WriteKind::Delete,
        }
    }
}

pub trait DocumentStore: Send {
    fn put(&mut self, key: &str, document: &Value) -> RemoteResult<()>;
    fn delete(&mut self, key: &str) -> RemoteResult<()>;
    fn fetch_all(&mut self) -> RemoteResult<DocumentSnapshot>;
    fn subscribe(&mut self) -> RemoteResult<SnapshotReceiver> {
        Err(RemoteError::Message(
            "snapshot subscriptions not supported".to_string(),
        ))
    }
}
