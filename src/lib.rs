//! Authoritative in-memory book collection with optimistic remote-document
//! sync and top-N reading statistics.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::BookStore`]:
//! ```
//! use booklog::{book::BookDraft, core::store::BookStore};
//!
//! let mut store = BookStore::new();
//! let (id, _request) = store.insert(BookDraft {
//!     author_name: "George Orwell".to_string(),
//!     book_name: "1984".to_string(),
//!     total_pages: 328,
//!     read_pages: 82,
//!     review: 5,
//!     is_completed: false,
//!     category: "Fiction".to_string(),
//! }).expect("insert");
//! assert_eq!(store.len(), 1);
//! assert_eq!(store.get(id).and_then(|b| b.reading_progress()), Some(25));
//! ```
//!
//! Runtime usage with the SQLite document backend:
//! ```no_run
//! use booklog::{
//!     book::BookDraft,
//!     core::store::BookStore,
//!     remote::sqlite::SqliteDocumentStore,
//!     runtime::handle::{RuntimeConfig, spawn_booklog},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = SqliteDocumentStore::open("books.db").expect("open sqlite");
//! let handle = spawn_booklog(
//!     BookStore::new(),
//!     Some(Box::new(backend)),
//!     RuntimeConfig::default(),
//! );
//! let id = handle.add(BookDraft {
//!     author_name: "George Orwell".to_string(),
//!     book_name: "1984".to_string(),
//!     total_pages: 328,
//!     read_pages: 82,
//!     review: 5,
//!     is_completed: false,
//!     category: "Fiction".to_string(),
//! }).await.expect("add");
//! let book = handle.get(id).await.expect("get").expect("book present");
//! assert_eq!(book.book_name, "1984");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Book domain records, patches, and the document codec.
pub mod book;
/// Core in-memory store and index helpers.
pub mod core;
/// Remote document-store contract and bundled backends.
pub mod remote;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Top-N frequency aggregations.
pub mod stats;
/// Shared identifier aliases and sync states.
pub mod types;
