use hashbrown::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    book::{BookDraft, BookPatch, BookRecord, ValidationError},
    core::indices::VecIndex,
    remote::{DocumentSnapshot, WriteOp, WriteRequest},
    types::{BookId, SyncState, WriteSeq},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no book with id {0}")]
    MissingBook(BookId),
    #[error("book {0} already exists")]
    AlreadyExists(BookId),
    #[error("index {index} out of bounds for collection of {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<BookId>,
    pub updated: Vec<BookId>,
    pub removed: Vec<BookId>,
    pub confirmed: Vec<BookId>,
    pub conflicted: Vec<BookId>,
    pub dropped_docs: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.confirmed.is_empty()
            && self.conflicted.is_empty()
            && self.dropped_docs == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncEntry {
    state: SyncState,
    pending_put: Option<WriteSeq>,
}

#[derive(Debug, Default)]
pub struct BookStore {
    records: HashMap<BookId, BookRecord>,
    order: Vec<BookId>,
    pos: HashMap<BookId, usize>,
    by_author: VecIndex<String>,
    by_category: VecIndex<String>,
    sync: HashMap<BookId, SyncEntry>,
    tombstones: HashMap<BookId, WriteSeq>,
    next_write_seq: WriteSeq,
}

impl BookStore {
    pub fn new() -> Self {
        Self {
            next_write_seq: 1,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, draft: BookDraft) -> Result<(BookId, WriteRequest), StoreError> {
        draft.validate()?;
        let id = Uuid::new_v4();
        if self.records.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }

        let book = BookRecord {
            id,
            author_name: draft.author_name,
            book_name: draft.book_name,
            total_pages: draft.total_pages,
            read_pages: draft.read_pages,
            review: draft.review,
            is_completed: draft.is_completed,
            category: draft.category,
        };

        let request = self.stage_put(&book);
        self.insert_indices(&book);
        self.pos.insert(id, self.order.len());
        self.order.push(id);
        self.records.insert(id, book);
        Ok((id, request))
    }

    pub fn update(&mut self, book: BookRecord) -> Result<WriteRequest, StoreError> {
        book.validate()?;
        let id = book.id;
        let existing = self.records.get(&id).ok_or(StoreError::MissingBook(id))?;
        let old_author = existing.author_name.clone();
        let old_category = existing.category.clone();

        self.migrate_indices(id, old_author, old_category, &book);
        let request = self.stage_put(&book);
        self.records.insert(id, book);
        Ok(request)
    }

    pub fn patch(&mut self, id: BookId, patch: BookPatch) -> Result<WriteRequest, StoreError> {
        patch.validate()?;
        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingBook(id))?;
        let old_author = rec.author_name.clone();
        let old_category = rec.category.clone();

        patch.apply_to(rec);
        let book = rec.clone();

        self.migrate_indices(id, old_author, old_category, &book);
        let request = self.stage_put(&book);
        Ok(request)
    }

    pub fn toggle_completion(&mut self, id: BookId) -> Result<(bool, WriteRequest), StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingBook(id))?;
        rec.is_completed = !rec.is_completed;
        let is_completed = rec.is_completed;
        let book = rec.clone();

        let request = self.stage_put(&book);
        Ok((is_completed, request))
    }

    pub fn remove(&mut self, id: BookId) -> Result<(BookRecord, WriteRequest), StoreError> {
        let book = self.detach(id).ok_or(StoreError::MissingBook(id))?;
        let request = self.stage_delete(id);
        Ok((book, request))
    }

    pub fn remove_at(&mut self, index: usize) -> Result<(BookRecord, WriteRequest), StoreError> {
        let id = *self.order.get(index).ok_or(StoreError::OutOfBounds {
            index,
            len: self.order.len(),
        })?;
        self.remove(id)
    }

    /// Reconciles one full server snapshot into the resident collection.
    ///
    /// Server-only documents are appended in snapshot order. Confirmed books
    /// follow the server. Unconfirmed books are confirmed on a field match,
    /// flagged as conflicts on a mismatch while no write is in flight, and
    /// left alone while one is. Tombstoned ids are skipped entirely.
    pub fn apply_snapshot(&mut self, docs: DocumentSnapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut incoming: Vec<BookRecord> = Vec::with_capacity(docs.len());
        for (key, document) in &docs {
            match BookRecord::from_document(key, document) {
                Ok(book) => incoming.push(book),
                Err(err) => {
                    tracing::warn!(key = key.as_str(), error = %err, "dropping malformed remote document");
                    report.dropped_docs += 1;
                }
            }
        }

        let present: HashSet<BookId> = incoming.iter().map(|b| b.id).collect();

        for book in incoming {
            let id = book.id;
            if self.tombstones.contains_key(&id) {
                continue;
            }
            let Some(state) = self.sync.get(&id).map(|e| e.state) else {
                self.adopt(book);
                report.added.push(id);
                continue;
            };
            match state {
                SyncState::Confirmed => {
                    if self.replace_from_server(book) {
                        report.updated.push(id);
                    }
                }
                SyncState::PendingConfirm | SyncState::LocalOnly | SyncState::Conflict => {
                    let matches = self.records.get(&id).is_some_and(|local| *local == book);
                    if matches {
                        if let Some(entry) = self.sync.get_mut(&id) {
                            entry.state = SyncState::Confirmed;
                            entry.pending_put = None;
                        }
                        report.confirmed.push(id);
                    } else if state == SyncState::LocalOnly {
                        if let Some(entry) = self.sync.get_mut(&id) {
                            entry.state = SyncState::Conflict;
                        }
                        report.conflicted.push(id);
                    }
                    // a pending write settles via its ack; a known conflict stays flagged
                }
            }
        }

        let resident: Vec<BookId> = self.order.clone();
        for id in resident {
            if present.contains(&id) {
                continue;
            }
            match self.sync.get(&id).map(|e| e.state) {
                Some(SyncState::Confirmed) => {
                    if self.detach(id).is_some() {
                        report.removed.push(id);
                    }
                }
                Some(SyncState::Conflict) => {
                    // the server copy is gone, so the kept local copy stands alone
                    if let Some(entry) = self.sync.get_mut(&id) {
                        entry.state = SyncState::LocalOnly;
                        entry.pending_put = None;
                    }
                }
                _ => {}
            }
        }

        // a tombstone survives only while the server still lists its id
        self.tombstones.retain(|id, _| present.contains(id));

        report
    }

    /// Settles the outcome of the put identified by `seq`. Returns the new
    /// state, or `None` when a newer write superseded this one.
    pub fn ack_put(&mut self, id: BookId, seq: WriteSeq, ok: bool) -> Option<SyncState> {
        let entry = self.sync.get_mut(&id)?;
        if entry.pending_put != Some(seq) {
            return None;
        }
        entry.pending_put = None;
        entry.state = if ok {
            SyncState::Confirmed
        } else {
            SyncState::LocalOnly
        };
        Some(entry.state)
    }

    /// Settles the outcome of the delete identified by `seq`. A failed delete
    /// drops the tombstone so the next snapshot can restore the server copy.
    /// Returns `None` when the tombstone belongs to a different write.
    pub fn ack_delete(&mut self, id: BookId, seq: WriteSeq, ok: bool) -> Option<bool> {
        match self.tombstones.get(&id) {
            Some(&tomb) if tomb == seq => {
                if !ok {
                    self.tombstones.remove(&id);
                }
                Some(ok)
            }
            _ => None,
        }
    }

    pub fn mark_local_only(&mut self, id: BookId) {
        if let Some(entry) = self.sync.get_mut(&id) {
            entry.state = SyncState::LocalOnly;
            entry.pending_put = None;
        }
    }

    pub fn drop_tombstone(&mut self, id: BookId) -> bool {
        self.tombstones.remove(&id).is_some()
    }

    pub fn get(&self, id: BookId) -> Option<&BookRecord> {
        self.records.get(&id)
    }

    pub fn get_cloned(&self, id: BookId) -> Option<BookRecord> {
        self.get(id).cloned()
    }

    pub fn books(&self) -> Vec<&BookRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn books_cloned(&self) -> Vec<BookRecord> {
        self.books().into_iter().cloned().collect()
    }

    pub fn by_author(&self, author: &str) -> Vec<&BookRecord> {
        self.by_author
            .get(author)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn by_author_cloned(&self, author: &str) -> Vec<BookRecord> {
        self.by_author(author).into_iter().cloned().collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&BookRecord> {
        self.by_category
            .get(category)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn by_category_cloned(&self, category: &str) -> Vec<BookRecord> {
        self.by_category(category).into_iter().cloned().collect()
    }

    pub fn ordered_ids(&self) -> &[BookId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn sync_state(&self, id: BookId) -> Option<SyncState> {
        self.sync.get(&id).map(|e| e.state)
    }

    pub fn has_tombstone(&self, id: BookId) -> bool {
        self.tombstones.contains_key(&id)
    }

    pub fn latest_write_seq(&self) -> WriteSeq {
        self.next_write_seq.saturating_sub(1)
    }

    fn stage_put(&mut self, book: &BookRecord) -> WriteRequest {
        let seq = self.take_next_write_seq();
        self.sync.insert(
            book.id,
            SyncEntry {
                state: SyncState::PendingConfirm,
                pending_put: Some(seq),
            },
        );
        WriteRequest {
            seq,
            id: book.id,
            op: WriteOp::Put {
                document: book.to_document(),
            },
        }
    }

    fn stage_delete(&mut self, id: BookId) -> WriteRequest {
        let seq = self.take_next_write_seq();
        self.tombstones.insert(id, seq);
        WriteRequest {
            seq,
            id,
            op: WriteOp::Delete,
        }
    }

    fn adopt(&mut self, book: BookRecord) {
        let id = book.id;
        self.insert_indices(&book);
        self.pos.insert(id, self.order.len());
        self.order.push(id);
        self.sync.insert(
            id,
            SyncEntry {
                state: SyncState::Confirmed,
                pending_put: None,
            },
        );
        self.records.insert(id, book);
    }

    fn replace_from_server(&mut self, book: BookRecord) -> bool {
        let id = book.id;
        let Some(existing) = self.records.get(&id) else {
            return false;
        };
        if *existing == book {
            return false;
        }
        let old_author = existing.author_name.clone();
        let old_category = existing.category.clone();

        self.migrate_indices(id, old_author, old_category, &book);
        self.records.insert(id, book);
        true
    }

    fn detach(&mut self, id: BookId) -> Option<BookRecord> {
        let book = self.records.remove(&id)?;
        if let Some(idx) = self.pos.remove(&id) {
            self.order.remove(idx);
            for later in &self.order[idx..] {
                if let Some(p) = self.pos.get_mut(later) {
                    *p -= 1;
                }
            }
        }
        Self::remove_from_vec_index(
            self.by_author.entry(book.author_name.clone()).or_default(),
            id,
        );
        Self::remove_from_vec_index(
            self.by_category.entry(book.category.clone()).or_default(),
            id,
        );
        self.sync.remove(&id);
        Some(book)
    }

    fn insert_indices(&mut self, book: &BookRecord) {
        self.by_author
            .entry(book.author_name.clone())
            .or_default()
            .push(book.id);
        self.by_category
            .entry(book.category.clone())
            .or_default()
            .push(book.id);
    }

    fn migrate_indices(
        &mut self,
        id: BookId,
        old_author: String,
        old_category: String,
        book: &BookRecord,
    ) {
        if book.author_name != old_author {
            Self::remove_from_vec_index(self.by_author.entry(old_author).or_default(), id);
            self.by_author
                .entry(book.author_name.clone())
                .or_default()
                .push(id);
        }
        if book.category != old_category {
            Self::remove_from_vec_index(self.by_category.entry(old_category).or_default(), id);
            self.by_category
                .entry(book.category.clone())
                .or_default()
                .push(id);
        }
    }

    fn remove_from_vec_index(v: &mut Vec<BookId>, id: BookId) {
        if let Some(pos) = v.iter().position(|x| *x == id) {
            v.remove(pos);
        }
    }

    fn take_next_write_seq(&mut self) -> WriteSeq {
        let seq = self.next_write_seq;
        self.next_write_seq += 1;
        seq
    }
}
