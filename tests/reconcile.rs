use booklog::{
    book::{BookDraft, BookPatch, BookRecord},
    core::store::BookStore,
    remote::DocumentSnapshot,
    types::SyncState,
};
use serde_json::{Value, json};
use uuid::Uuid;

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

fn doc_for(book: &BookRecord) -> (String, Value) {
    (book.id.to_string(), book.to_document())
}

fn foreign_doc(author: &str, name: &str) -> (String, Value) {
    (
        Uuid::new_v4().to_string(),
        json!({
            "authorName": author,
            "bookName": name,
            "totalPages": 200,
            "readPages": 10,
            "review": 3,
            "isCompleted": false,
            "category": "Novel",
        }),
    )
}

#[test]
fn snapshot_appends_server_books_in_order() {
    let mut store = BookStore::new();
    let docs: DocumentSnapshot = vec![
        foreign_doc("Orwell", "1984"),
        foreign_doc("Huxley", "Brave New World"),
    ];

    let report = store.apply_snapshot(docs.clone());
    assert_eq!(report.added.len(), 2);
    assert_eq!(store.len(), 2);

    let books = store.books_cloned();
    assert_eq!(books[0].book_name, "1984");
    assert_eq!(books[1].book_name, "Brave New World");
    assert_eq!(store.sync_state(books[0].id), Some(SyncState::Confirmed));

    assert!(store.apply_snapshot(docs).is_noop());
}

#[test]
fn server_overwrites_confirmed_books() {
    let mut store = BookStore::new();
    let docs = vec![foreign_doc("Orwell", "1984")];
    store.apply_snapshot(docs.clone());
    let id = store.books_cloned()[0].id;

    let mut changed = docs;
    changed[0].1["readPages"] = json!(190);
    let report = store.apply_snapshot(changed);

    assert_eq!(report.updated, vec![id]);
    assert_eq!(store.get(id).unwrap().read_pages, 190);
    assert_eq!(store.sync_state(id), Some(SyncState::Confirmed));
}

#[test]
fn matching_snapshot_confirms_unconfirmed_local_book() {
    let mut store = BookStore::new();
    let (id, _) = store.insert(draft("Orwell", "1984")).unwrap();

    let report = store.apply_snapshot(vec![doc_for(store.get(id).unwrap())]);
    assert_eq!(report.confirmed, vec![id]);
    assert_eq!(store.sync_state(id), Some(SyncState::Confirmed));
}

#[test]
fn divergent_snapshot_conflicts_local_only_book_and_keeps_local_fields() {
    let mut store = BookStore::new();
    let (id, _) = store.insert(draft("Orwell", "1984")).unwrap();
    store.mark_local_only(id);

    let mut doc = store.get(id).unwrap().to_document();
    doc["review"] = json!(1);
    let report = store.apply_snapshot(vec![(id.to_string(), doc)]);

    assert_eq!(report.conflicted, vec![id]);
    assert_eq!(store.sync_state(id), Some(SyncState::Conflict));
    assert_eq!(store.get(id).unwrap().review, 4);
}

#[test]
fn divergent_snapshot_leaves_pending_book_alone() {
    let mut store = BookStore::new();
    let (id, _) = store.insert(draft("Orwell", "1984")).unwrap();

    let mut doc = store.get(id).unwrap().to_document();
    doc["review"] = json!(1);
    let report = store.apply_snapshot(vec![(id.to_string(), doc)]);

    assert!(report.conflicted.is_empty());
    assert_eq!(store.sync_state(id), Some(SyncState::PendingConfirm));
    assert_eq!(store.get(id).unwrap().review, 4);
}

#[test]
fn absent_books_are_removed_only_when_confirmed() {
    let mut store = BookStore::new();
    store.apply_snapshot(vec![foreign_doc("Orwell", "1984")]);
    let confirmed_id = store.books_cloned()[0].id;

    let (local_id, _) = store.insert(draft("Huxley", "Brave New World")).unwrap();

    let report = store.apply_snapshot(Vec::new());
    assert_eq!(report.removed, vec![confirmed_id]);
    assert!(store.get(confirmed_id).is_none());
    assert!(store.get(local_id).is_some());
    assert_eq!(store.sync_state(local_id), Some(SyncState::PendingConfirm));
}

#[test]
fn conflicted_book_becomes_local_only_when_server_drops_it() {
    let mut store = BookStore::new();
    let (id, _) = store.insert(draft("Orwell", "1984")).unwrap();
    store.mark_local_only(id);

    let mut doc = store.get(id).unwrap().to_document();
    doc["review"] = json!(1);
    store.apply_snapshot(vec![(id.to_string(), doc)]);
    assert_eq!(store.sync_state(id), Some(SyncState::Conflict));

    store.apply_snapshot(Vec::new());
    assert_eq!(store.sync_state(id), Some(SyncState::LocalOnly));
    assert!(store.get(id).is_some());
}

#[test]
fn tombstone_blocks_resurrection_until_server_forgets() {
    let mut store = BookStore::new();
    let docs = vec![foreign_doc("Orwell", "1984")];
    store.apply_snapshot(docs.clone());
    let id = store.books_cloned()[0].id;

    store.remove(id).unwrap();
    assert!(store.has_tombstone(id));

    // the server still lists the doc; the local delete must not be undone
    let report = store.apply_snapshot(docs);
    assert!(report.is_noop());
    assert!(store.get(id).is_none());
    assert!(store.has_tombstone(id));

    // server caught up: the tombstone clears
    let report = store.apply_snapshot(Vec::new());
    assert!(report.is_noop());
    assert!(!store.has_tombstone(id));
}

#[test]
fn failed_delete_lets_snapshot_restore_the_book() {
    let mut store = BookStore::new();
    let docs = vec![foreign_doc("Orwell", "1984")];
    store.apply_snapshot(docs.clone());
    let id = store.books_cloned()[0].id;

    let (_, request) = store.remove(id).unwrap();
    assert_eq!(store.ack_delete(id, request.seq, false), Some(false));
    assert!(!store.has_tombstone(id));

    let report = store.apply_snapshot(docs);
    assert_eq!(report.added, vec![id]);
    assert_eq!(store.sync_state(id), Some(SyncState::Confirmed));
}

#[test]
fn stale_put_ack_cannot_settle_a_newer_write() {
    let mut store = BookStore::new();
    let (id, first) = store.insert(draft("Orwell", "1984")).unwrap();
    let second = store
        .patch(
            id,
            BookPatch {
                read_pages: Some(100),
                ..BookPatch::default()
            },
        )
        .unwrap();

    assert_eq!(store.ack_put(id, first.seq, true), None);
    assert_eq!(store.sync_state(id), Some(SyncState::PendingConfirm));

    assert_eq!(store.ack_put(id, second.seq, true), Some(SyncState::Confirmed));
    assert_eq!(store.sync_state(id), Some(SyncState::Confirmed));
}

#[test]
fn failed_put_falls_back_to_local_only() {
    let mut store = BookStore::new();
    let (id, request) = store.insert(draft("Orwell", "1984")).unwrap();

    assert_eq!(
        store.ack_put(id, request.seq, false),
        Some(SyncState::LocalOnly)
    );
    assert!(store.get(id).is_some());
}

#[test]
fn local_edit_clears_conflict_flag() {
    let mut store = BookStore::new();
    let (id, _) = store.insert(draft("Orwell", "1984")).unwrap();
    store.mark_local_only(id);

    let mut doc = store.get(id).unwrap().to_document();
    doc["review"] = json!(1);
    store.apply_snapshot(vec![(id.to_string(), doc)]);
    assert_eq!(store.sync_state(id), Some(SyncState::Conflict));

    store
        .patch(
            id,
            BookPatch {
                review: Some(5),
                ..BookPatch::default()
            },
        )
        .unwrap();
    assert_eq!(store.sync_state(id), Some(SyncState::PendingConfirm));
}

#[test]
fn malformed_documents_are_dropped_not_partially_applied() {
    let mut store = BookStore::new();
    let (good_key, good_doc) = foreign_doc("Orwell", "1984");

    let report = store.apply_snapshot(vec![
        (good_key, good_doc),
        ("not-a-uuid".to_string(), json!({"authorName": "X"})),
        (
            Uuid::new_v4().to_string(),
            json!({"authorName": "Y", "bookName": "Z"}),
        ),
        (
            Uuid::new_v4().to_string(),
            json!({
                "authorName": "W",
                "bookName": "V",
                "totalPages": "many",
                "readPages": 1,
                "review": 2,
                "isCompleted": false,
                "category": "Fiction",
            }),
        ),
    ]);

    assert_eq!(report.added.len(), 1);
    assert_eq!(report.dropped_docs, 3);
    assert_eq!(store.len(), 1);
}

#[test]
fn inbound_documents_skip_local_range_validation() {
    let mut store = BookStore::new();
    let (key, mut doc) = foreign_doc("Orwell", "1984");
    doc["review"] = json!(9);
    doc["readPages"] = json!(500);

    let report = store.apply_snapshot(vec![(key, doc)]);
    assert_eq!(report.added.len(), 1);

    let book = store.books_cloned().remove(0);
    assert_eq!(book.review, 9);
    assert_eq!(book.reading_progress(), Some(250));
}
