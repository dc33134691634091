use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    book::{BookDraft, BookPatch, BookRecord},
    core::store::{BookStore, ReconcileReport, StoreError},
    remote::{DocumentSnapshot, DocumentStore, RemoteError, SnapshotReceiver, WriteKind, WriteOp, WriteRequest},
    stats,
    types::{BookId, SyncState, WriteSeq},
};

use super::events::BookEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("runtime channel closed")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub fetch_on_spawn: bool,
    pub command_queue_bound: usize,
    pub remote_queue_bound: usize,
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fetch_on_spawn: true,
            command_queue_bound: 256,
            remote_queue_bound: 64,
            event_capacity: 1024,
        }
    }
}

pub struct BookLogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<BookEvent>,
}

impl Clone for BookLogHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Add {
        draft: BookDraft,
        resp: oneshot::Sender<Result<BookId, RuntimeError>>,
    },
    Update {
        book: BookRecord,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Patch {
        id: BookId,
        patch: BookPatch,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    ToggleCompletion {
        id: BookId,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Remove {
        id: BookId,
        resp: oneshot::Sender<Result<BookRecord, RuntimeError>>,
    },
    RemoveAt {
        index: usize,
        resp: oneshot::Sender<Result<BookRecord, RuntimeError>>,
    },
    Get {
        id: BookId,
        resp: oneshot::Sender<Option<BookRecord>>,
    },
    Books {
        resp: oneshot::Sender<Vec<BookRecord>>,
    },
    ByAuthor {
        author: String,
        resp: oneshot::Sender<Vec<BookRecord>>,
    },
    ByCategory {
        category: String,
        resp: oneshot::Sender<Vec<BookRecord>>,
    },
    TopAuthors {
        n: usize,
        resp: oneshot::Sender<Vec<(String, usize)>>,
    },
    TopCategories {
        n: usize,
        resp: oneshot::Sender<Vec<(String, usize)>>,
    },
    SyncStateOf {
        id: BookId,
        resp: oneshot::Sender<Option<SyncState>>,
    },
    Refresh {
        resp: oneshot::Sender<Result<usize, RuntimeError>>,
    },
    ApplySnapshot {
        docs: DocumentSnapshot,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum RemoteMsg {
    Write(WriteRequest),
    Fetch {
        resp: oneshot::Sender<Result<DocumentSnapshot, RemoteError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct WriteOutcome {
    seq: WriteSeq,
    id: BookId,
    kind: WriteKind,
    result: Result<(), RemoteError>,
}

pub fn spawn_booklog(
    store: BookStore,
    backend: Option<Box<dyn DocumentStore>>,
    config: RuntimeConfig,
) -> BookLogHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<BookEvent>(config.event_capacity);

    let (remote_tx_opt, mut outcome_rx, listener) = if let Some(mut backend) = backend {
        let watch_rx = match backend.subscribe() {
            Ok(rx) => Some(rx),
            Err(err) => {
                warn!(error = %err, "remote snapshot subscription unavailable");
                None
            }
        };

        let (remote_tx, remote_rx) = mpsc::channel::<RemoteMsg>(config.remote_queue_bound);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<WriteOutcome>();
        spawn_remote_worker(backend, remote_rx, outcome_tx);

        let listener = watch_rx.map(|rx| spawn_snapshot_listener(rx, cmd_tx.downgrade()));
        (Some(remote_tx), Some(outcome_rx), listener)
    } else {
        (None, None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;

        if config.fetch_on_spawn {
            if let Some(tx) = remote_tx_opt.as_ref() {
                if let Err(err) = load_from_remote(&mut store, tx, &events_tx_loop).await {
                    warn!(error = %err, "initial remote load failed");
                }
            }
        }

        loop {
            if let Some(rx) = outcome_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut store,
                            &events_tx_loop,
                            remote_tx_opt.as_ref(),
                        ).await;

                        if done {
                            break;
                        }
                    }
                    outcome = rx.recv() => {
                        if let Some(outcome) = outcome {
                            settle_outcome(outcome, &mut store, &events_tx_loop);
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut store,
                    &events_tx_loop,
                    remote_tx_opt.as_ref(),
                ).await;
                if done {
                    break;
                }
            }
        }

        if let Some(task) = listener {
            task.abort();
        }
    });

    BookLogHandle { cmd_tx, events_tx }
}

impl BookLogHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.events_tx.subscribe()
    }

    pub async fn add(&self, draft: BookDraft) -> Result<BookId, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Add { draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn update(&self, book: BookRecord) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Update { book, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn patch(&self, id: BookId, patch: BookPatch) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Patch { id, patch, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn toggle_completion(&self, id: BookId) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ToggleCompletion { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn remove(&self, id: BookId) -> Result<BookRecord, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Remove { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn remove_at(&self, index: usize) -> Result<BookRecord, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RemoveAt { index, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn get(&self, id: BookId) -> Result<Option<BookRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn books(&self) -> Result<Vec<BookRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Books { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn by_author(&self, author: impl Into<String>) -> Result<Vec<BookRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ByAuthor {
                author: author.into(),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn by_category(&self, category: impl Into<String>) -> Result<Vec<BookRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ByCategory {
                category: category.into(),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn top_authors(&self, n: usize) -> Result<Vec<(String, usize)>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::TopAuthors { n, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn top_categories(&self, n: usize) -> Result<Vec<(String, usize)>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::TopCategories { n, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn sync_state(&self, id: BookId) -> Result<Option<SyncState>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SyncStateOf { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn refresh(&self) -> Result<usize, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Refresh { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut BookStore,
    events_tx: &broadcast::Sender<BookEvent>,
    remote_tx: Option<&mpsc::Sender<RemoteMsg>>,
) -> bool {
    match cmd {
        Command::Add { draft, resp } => {
            let res = store
                .insert(draft)
                .map_err(RuntimeError::from)
                .and_then(|(id, request)| {
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::Added { id });
                    Ok(id)
                });
            let _ = resp.send(res);
        }
        Command::Update { book, resp } => {
            let id = book.id;
            let res = store
                .update(book)
                .map_err(RuntimeError::from)
                .and_then(|request| {
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::Updated { id });
                    Ok(())
                });
            let _ = resp.send(res);
        }
        Command::Patch { id, patch, resp } => {
            let res = store
                .patch(id, patch)
                .map_err(RuntimeError::from)
                .and_then(|request| {
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::Updated { id });
                    Ok(())
                });
            let _ = resp.send(res);
        }
        Command::ToggleCompletion { id, resp } => {
            let res = store
                .toggle_completion(id)
                .map_err(RuntimeError::from)
                .and_then(|(is_completed, request)| {
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::CompletionToggled { id, is_completed });
                    Ok(is_completed)
                });
            let _ = resp.send(res);
        }
        Command::Remove { id, resp } => {
            let res = store
                .remove(id)
                .map_err(RuntimeError::from)
                .and_then(|(book, request)| {
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::Removed { id });
                    Ok(book)
                });
            let _ = resp.send(res);
        }
        Command::RemoveAt { index, resp } => {
            let res = store
                .remove_at(index)
                .map_err(RuntimeError::from)
                .and_then(|(book, request)| {
                    let id = book.id;
                    dispatch_write(store, remote_tx, request)?;
                    let _ = events_tx.send(BookEvent::Removed { id });
                    Ok(book)
                });
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(id));
        }
        Command::Books { resp } => {
            let _ = resp.send(store.books_cloned());
        }
        Command::ByAuthor { author, resp } => {
            let _ = resp.send(store.by_author_cloned(&author));
        }
        Command::ByCategory { category, resp } => {
            let _ = resp.send(store.by_category_cloned(&category));
        }
        Command::TopAuthors { n, resp } => {
            let _ = resp.send(stats::top_authors(store.books(), n));
        }
        Command::TopCategories { n, resp } => {
            let _ = resp.send(stats::top_categories(store.books(), n));
        }
        Command::SyncStateOf { id, resp } => {
            let _ = resp.send(store.sync_state(id));
        }
        Command::Refresh { resp } => {
            let out = if let Some(tx) = remote_tx {
                load_from_remote(store, tx, events_tx).await
            } else {
                Ok(store.len())
            };
            let _ = resp.send(out);
        }
        Command::ApplySnapshot { docs } => {
            let report = store.apply_snapshot(docs);
            emit_sync_transitions(&report, events_tx);
            if !report.is_noop() {
                debug!(
                    added = report.added.len(),
                    updated = report.updated.len(),
                    removed = report.removed.len(),
                    confirmed = report.confirmed.len(),
                    conflicted = report.conflicted.len(),
                    dropped = report.dropped_docs,
                    "server snapshot reconciled"
                );
            }
            let _ = events_tx.send(BookEvent::SnapshotApplied {
                added: report.added.len(),
                updated: report.updated.len(),
                removed: report.removed.len(),
            });
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = remote_tx {
                let (done_tx, done_rx) = oneshot::channel();
                let send_res = tx.send(RemoteMsg::Shutdown { resp: done_tx }).await;
                if send_res.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    match done_rx.await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(RuntimeError::ChannelClosed),
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

async fn load_from_remote(
    store: &mut BookStore,
    tx: &mpsc::Sender<RemoteMsg>,
    events_tx: &broadcast::Sender<BookEvent>,
) -> Result<usize, RuntimeError> {
    let docs = fetch_snapshot(tx).await?;
    let report = store.apply_snapshot(docs);
    emit_sync_transitions(&report, events_tx);
    debug!(
        books = store.len(),
        dropped = report.dropped_docs,
        "remote snapshot loaded"
    );
    let _ = events_tx.send(BookEvent::Loaded { books: store.len() });
    Ok(store.len())
}

async fn fetch_snapshot(tx: &mpsc::Sender<RemoteMsg>) -> Result<DocumentSnapshot, RuntimeError> {
    let (fetch_tx, fetch_rx) = oneshot::channel();
    tx.send(RemoteMsg::Fetch { resp: fetch_tx })
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?;
    fetch_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map_err(RuntimeError::from)
}

fn emit_sync_transitions(report: &ReconcileReport, events_tx: &broadcast::Sender<BookEvent>) {
    for id in &report.confirmed {
        let _ = events_tx.send(BookEvent::Confirmed { id: *id });
    }
    for id in &report.conflicted {
        let _ = events_tx.send(BookEvent::Conflicted { id: *id });
    }
}

fn settle_outcome(
    outcome: WriteOutcome,
    store: &mut BookStore,
    events_tx: &broadcast::Sender<BookEvent>,
) {
    let WriteOutcome {
        seq,
        id,
        kind,
        result,
    } = outcome;
    let ok = match &result {
        Ok(()) => true,
        Err(err) => {
            warn!(book = %id, ?kind, error = %err, "remote write failed");
            false
        }
    };

    match kind {
        WriteKind::Put => match store.ack_put(id, seq, ok) {
            Some(SyncState::Confirmed) => {
                let _ = events_tx.send(BookEvent::Confirmed { id });
            }
            Some(SyncState::LocalOnly) => {
                let _ = events_tx.send(BookEvent::WriteFailed { id, kind });
            }
            // a newer write superseded this outcome, or the book is gone
            _ => {}
        },
        WriteKind::Delete => {
            if let Some(false) = store.ack_delete(id, seq, ok) {
                let _ = events_tx.send(BookEvent::WriteFailed { id, kind });
            }
        }
    }
}

fn dispatch_write(
    store: &mut BookStore,
    remote_tx: Option<&mpsc::Sender<RemoteMsg>>,
    request: WriteRequest,
) -> Result<(), RuntimeError> {
    let Some(tx) = remote_tx else {
        // no backend: the mutation stays local
        settle_unsent(store, request);
        return Ok(());
    };

    match tx.try_send(RemoteMsg::Write(request)) {
        Ok(()) => Ok(()),
        Err(err) => {
            let reason = err.to_string();
            if let RemoteMsg::Write(request) = err.into_inner() {
                settle_unsent(store, request);
            }
            Err(RuntimeError::Remote(RemoteError::Message(format!(
                "remote queue error: {reason}"
            ))))
        }
    }
}

fn settle_unsent(store: &mut BookStore, request: WriteRequest) {
    match request.kind() {
        WriteKind::Put => store.mark_local_only(request.id),
        WriteKind::Delete => {
            store.drop_tombstone(request.id);
        }
    }
}

fn spawn_snapshot_listener(
    mut watch_rx: SnapshotReceiver,
    cmd_tx: mpsc::WeakSender<Command>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(docs) = watch_rx.recv().await {
            let Some(tx) = cmd_tx.upgrade() else { break };
            if tx.send(Command::ApplySnapshot { docs }).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_remote_worker(
    backend: Box<dyn DocumentStore>,
    mut rx: mpsc::Receiver<RemoteMsg>,
    outcome_tx: mpsc::UnboundedSender<WriteOutcome>,
) {
    let backend = Arc::new(Mutex::new(backend));
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                RemoteMsg::Write(request) => {
                    let seq = request.seq;
                    let id = request.id;
                    let kind = request.kind();
                    let result = execute_write(&backend, request).await;
                    let _ = outcome_tx.send(WriteOutcome {
                        seq,
                        id,
                        kind,
                        result,
                    });
                }
                RemoteMsg::Fetch { resp } => {
                    let backend_ref = Arc::clone(&backend);
                    let result = match tokio::task::spawn_blocking(move || {
                        let mut backend = backend_ref.blocking_lock();
                        backend.fetch_all()
                    })
                    .await
                    {
                        Ok(inner) => inner,
                        Err(e) => Err(RemoteError::Message(format!("join error: {e}"))),
                    };
                    let _ = resp.send(result);
                }
                RemoteMsg::Shutdown { resp } => {
                    let _ = resp.send(());
                    break;
                }
            }
        }
    });
}

async fn execute_write(
    backend: &Arc<Mutex<Box<dyn DocumentStore>>>,
    request: WriteRequest,
) -> Result<(), RemoteError> {
    let backend_ref = Arc::clone(backend);
    match tokio::task::spawn_blocking(move || {
        let mut backend = backend_ref.blocking_lock();
        let key = request.doc_key();
        match &request.op {
            WriteOp::Put { document } => backend.put(&key, document),
            WriteOp::Delete => backend.delete(&key),
        }
    })
    .await
    {
        Ok(inner) => inner,
        Err(e) => Err(RemoteError::Message(format!("join error: {e}"))),
    }
}
