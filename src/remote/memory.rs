//! In-process document store for tests and offline runs.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc;

use super::{DocumentSnapshot, DocumentStore, RemoteResult, SnapshotReceiver};
use crate::types::DocKey;

/// Keeps documents in a sorted map and pushes a full snapshot to every
/// subscriber after each successful mutation. Subscribers also receive the
/// current contents immediately on subscribe.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: BTreeMap<DocKey, Value>,
    subscribers: Vec<mpsc::UnboundedSender<DocumentSnapshot>>,
}

impl MemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `documents`.
    pub fn with_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (DocKey, Value)>,
    {
        Self {
            docs: documents.into_iter().collect(),
            subscribers: Vec::new(),
        }
    }

    /// Current contents in key order.
    pub fn snapshot(&self) -> DocumentSnapshot {
        self.docs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn put(&mut self, key: &str, document: &Value) -> RemoteResult<()> {
        self.docs.insert(key.to_string(), document.clone());
        self.notify();
        Ok(())
    }

    fn delete(&mut self, key: &str) -> RemoteResult<()> {
        self.docs.remove(key);
        self.notify();
        Ok(())
    }

    fn fetch_all(&mut self) -> RemoteResult<DocumentSnapshot> {
        Ok(self.snapshot())
    }

    fn subscribe(&mut self) -> RemoteResult<SnapshotReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.snapshot());
        self.subscribers.push(tx);
        Ok(rx)
    }
}
