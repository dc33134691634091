use tempfile::TempDir;

use booklog::{
    book::BookDraft,
    core::store::BookStore,
    remote::{DocumentStore, sqlite::SqliteDocumentStore},
    runtime::handle::{RuntimeConfig, spawn_booklog},
    types::SyncState,
};
use serde_json::json;

fn draft(author: &str, name: &str) -> BookDraft {
    BookDraft {
        author_name: author.to_string(),
        book_name: name.to_string(),
        total_pages: 320,
        read_pages: 40,
        review: 4,
        is_completed: false,
        category: "Fiction".to_string(),
    }
}

#[test]
fn upsert_preserves_first_insert_order() {
    let mut store = SqliteDocumentStore::open_in_memory().expect("open");

    store.put("alpha", &json!({"v": 1})).expect("put alpha");
    store.put("beta", &json!({"v": 2})).expect("put beta");
    store.put("alpha", &json!({"v": 3})).expect("upsert alpha");

    let docs = store.fetch_all().expect("fetch");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0], ("alpha".to_string(), json!({"v": 3})));
    assert_eq!(docs[1], ("beta".to_string(), json!({"v": 2})));
}

#[test]
fn delete_is_idempotent() {
    let mut store = SqliteDocumentStore::open_in_memory().expect("open");

    store.delete("missing").expect("delete absent");

    store.put("alpha", &json!({"v": 1})).expect("put");
    store.delete("alpha").expect("delete");
    store.delete("alpha").expect("delete again");

    assert!(store.fetch_all().expect("fetch").is_empty());
}

#[test]
fn reopen_round_trips_documents() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("books.db");

    {
        let mut store = SqliteDocumentStore::open(&db_path).expect("open");
        store.put("alpha", &json!({"v": 1})).expect("put alpha");
        store.put("beta", &json!({"v": 2})).expect("put beta");
    }

    let mut reopened = SqliteDocumentStore::open(&db_path).expect("reopen");
    let docs = reopened.fetch_all().expect("fetch");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].0, "alpha");
    assert_eq!(docs[1].0, "beta");
    assert_eq!(docs[1].1, json!({"v": 2}));
}

#[test]
fn subscribe_pushes_current_state_then_updates() {
    let mut store = SqliteDocumentStore::open_in_memory().expect("open");
    store.put("alpha", &json!({"v": 1})).expect("put alpha");

    let mut rx = store.subscribe().expect("subscribe");
    let initial = rx.try_recv().expect("initial snapshot");
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].0, "alpha");

    store.put("beta", &json!({"v": 2})).expect("put beta");
    let pushed = rx.try_recv().expect("pushed snapshot");
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[1].0, "beta");
}

#[tokio::test]
async fn runtime_round_trips_collection_through_sqlite() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("books.db");

    let backend = SqliteDocumentStore::open(&db_path).expect("open sqlite");
    let handle = spawn_booklog(
        BookStore::new(),
        Some(Box::new(backend)),
        RuntimeConfig::default(),
    );

    let id1 = handle.add(draft("Orwell", "1984")).await.expect("add1");
    let id2 = handle
        .add(draft("Huxley", "Brave New World"))
        .await
        .expect("add2");
    handle.toggle_completion(id1).await.expect("toggle");
    handle.shutdown().await.expect("shutdown");

    let backend = SqliteDocumentStore::open(&db_path).expect("reopen");
    let handle = spawn_booklog(
        BookStore::new(),
        Some(Box::new(backend)),
        RuntimeConfig::default(),
    );

    let books = handle.books().await.expect("books");
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].id, id1);
    assert!(books[0].is_completed);
    assert_eq!(books[1].id, id2);
    assert_eq!(
        handle.sync_state(id1).await.expect("sync state"),
        Some(SyncState::Confirmed)
    );

    handle.shutdown().await.expect("shutdown reopened");
}
