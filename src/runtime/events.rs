//! Runtime event stream payloads.

use crate::{remote::WriteKind, types::BookId};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// A new book was added locally.
    Added {
        /// Added book id.
        id: BookId,
    },
    /// An existing book was updated or patched locally.
    Updated {
        /// Updated book id.
        id: BookId,
    },
    /// A completion flag was flipped.
    CompletionToggled {
        /// Toggled book id.
        id: BookId,
        /// Flag value after the toggle.
        is_completed: bool,
    },
    /// A book was removed locally.
    Removed {
        /// Removed book id.
        id: BookId,
    },
    /// The initial fetch or a manual refresh was applied.
    Loaded {
        /// Resident collection size afterwards.
        books: usize,
    },
    /// A pushed server snapshot was reconciled into the collection.
    SnapshotApplied {
        /// Server-only books appended.
        added: usize,
        /// Confirmed books replaced by server values.
        updated: usize,
        /// Books removed because the server no longer has them.
        removed: usize,
    },
    /// The latest write for this book succeeded; local and server agree.
    Confirmed {
        /// Confirmed book id.
        id: BookId,
    },
    /// A server snapshot diverged from an unconfirmed local edit. The local
    /// fields were kept.
    Conflicted {
        /// Conflicted book id.
        id: BookId,
    },
    /// A remote write failed. A failed put falls back to local-only; a
    /// failed delete lets the next snapshot restore the server copy.
    WriteFailed {
        /// Affected book id.
        id: BookId,
        /// Kind of the failed write.
        kind: WriteKind,
    },
}
