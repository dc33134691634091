//! Shared identifier aliases and per-book sync states.

use uuid::Uuid;

/// Globally unique book identifier, assigned at creation. Its hyphenated
/// string form is the remote document key.
pub type BookId = Uuid;
/// String key addressing one remote document.
pub type DocKey = String;
/// Monotonic sequence assigned to each staged remote write.
pub type WriteSeq = u64;

/// Synchronization state of one resident book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Applied locally; no remote write in flight.
    LocalOnly,
    /// A remote write was dispatched and its outcome is not yet known.
    PendingConfirm,
    /// Local and server state agreed the last time they met.
    Confirmed,
    /// A server snapshot diverged from an unconfirmed local edit; the local
    /// fields were kept.
    Conflict,
}
