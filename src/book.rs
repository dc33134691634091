//! Book domain record, draft, patch, validation, and the document codec.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::types::{BookId, DocKey};

/// Inclusive review range accepted from local callers.
pub const REVIEW_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Category labels offered by the add/edit surface. The storage layer treats
/// categories as free-form strings; this list is not a closed set.
pub const KNOWN_CATEGORIES: [&str; 9] = [
    "Fiction",
    "Thriller",
    "Novel",
    "Romance",
    "Fantasy",
    "Mystery",
    "Horror",
    "Self-Improvement",
    "Psychology",
];

/// Rejection reasons for caller-supplied book fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Author name is empty.
    #[error("author name must not be empty")]
    EmptyAuthorName,
    /// Book name is empty.
    #[error("book name must not be empty")]
    EmptyBookName,
    /// Review is outside [`REVIEW_RANGE`].
    #[error("review {0} outside 1..=5")]
    ReviewOutOfRange(u8),
}

/// Reasons an inbound remote document was dropped from a snapshot.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Document key does not parse as a book id.
    #[error("document key {0:?} is not a valid book id")]
    BadKey(String),
    /// A required field is missing or has the wrong type.
    #[error("malformed document fields: {0}")]
    Fields(#[from] serde_json::Error),
}

/// Fully materialized, authoritative book record.
///
/// The id never travels inside the document body; it is carried as the
/// document key and restored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    /// Stable book identifier.
    #[serde(skip)]
    pub id: BookId,
    /// Author display name.
    pub author_name: String,
    /// Book title.
    pub book_name: String,
    /// Total page count; zero means the length is unknown.
    pub total_pages: u32,
    /// Pages read so far. May exceed `total_pages`.
    pub read_pages: u32,
    /// Reader review. Local writes enforce [`REVIEW_RANGE`]; decoded
    /// documents are taken as-is.
    pub review: u8,
    /// Completion flag, independent of the page counters.
    pub is_completed: bool,
    /// Category label.
    pub category: String,
}

impl BookRecord {
    /// Whole percentage of pages read, floored. `None` when `total_pages`
    /// is zero. Not clamped, so values above 100 are possible.
    pub fn reading_progress(&self) -> Option<u64> {
        if self.total_pages == 0 {
            return None;
        }
        Some(u64::from(self.read_pages) * 100 / u64::from(self.total_pages))
    }

    /// Remote document key for this record.
    pub fn doc_key(&self) -> DocKey {
        self.id.to_string()
    }

    /// Checks the constraints enforced on locally supplied records.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.author_name, &self.book_name, self.review)
    }

    /// Encodes the seven wire fields as a document body.
    pub fn to_document(&self) -> Value {
        json!({
            "authorName": self.author_name,
            "bookName": self.book_name,
            "totalPages": self.total_pages,
            "readPages": self.read_pages,
            "review": self.review,
            "isCompleted": self.is_completed,
            "category": self.category,
        })
    }

    /// Decodes a remote document addressed by `key`. Every wire field must be
    /// present with its expected type or the whole document is rejected;
    /// unknown fields are ignored.
    pub fn from_document(key: &str, document: &Value) -> Result<Self, DecodeError> {
        let id: BookId = key
            .parse()
            .map_err(|_| DecodeError::BadKey(key.to_string()))?;
        let mut record: BookRecord = serde_json::from_value(document.clone())?;
        record.id = id;
        Ok(record)
    }
}

/// Insert payload used to create a new [`BookRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDraft {
    /// Author display name.
    pub author_name: String,
    /// Book title.
    pub book_name: String,
    /// Total page count.
    pub total_pages: u32,
    /// Pages already read.
    pub read_pages: u32,
    /// Reader review in [`REVIEW_RANGE`].
    pub review: u8,
    /// Completion flag.
    pub is_completed: bool,
    /// Category label.
    pub category: String,
}

impl BookDraft {
    /// Checks the constraints enforced on locally supplied drafts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.author_name, &self.book_name, self.review)
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookPatch {
    /// Optional replacement for the author name.
    pub author_name: Option<String>,
    /// Optional replacement for the book title.
    pub book_name: Option<String>,
    /// Optional replacement for the total page count.
    pub total_pages: Option<u32>,
    /// Optional replacement for the read page count.
    pub read_pages: Option<u32>,
    /// Optional replacement for the review.
    pub review: Option<u8>,
    /// Optional replacement for the completion flag.
    pub is_completed: Option<bool>,
    /// Optional replacement for the category.
    pub category: Option<String>,
}

impl BookPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Checks the set fields against the local write constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(author_name) = &self.author_name {
            if author_name.is_empty() {
                return Err(ValidationError::EmptyAuthorName);
            }
        }
        if let Some(book_name) = &self.book_name {
            if book_name.is_empty() {
                return Err(ValidationError::EmptyBookName);
            }
        }
        if let Some(review) = self.review {
            if !REVIEW_RANGE.contains(&review) {
                return Err(ValidationError::ReviewOutOfRange(review));
            }
        }
        Ok(())
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut BookRecord) {
        if let Some(v) = &self.author_name {
            rec.author_name = v.clone();
        }
        if let Some(v) = &self.book_name {
            rec.book_name = v.clone();
        }
        if let Some(v) = self.total_pages {
            rec.total_pages = v;
        }
        if let Some(v) = self.read_pages {
            rec.read_pages = v;
        }
        if let Some(v) = self.review {
            rec.review = v;
        }
        if let Some(v) = self.is_completed {
            rec.is_completed = v;
        }
        if let Some(v) = &self.category {
            rec.category = v.clone();
        }
    }
}

fn validate_fields(author_name: &str, book_name: &str, review: u8) -> Result<(), ValidationError> {
    if author_name.is_empty() {
        return Err(ValidationError::EmptyAuthorName);
    }
    if book_name.is_empty() {
        return Err(ValidationError::EmptyBookName);
    }
    if !REVIEW_RANGE.contains(&review) {
        return Err(ValidationError::ReviewOutOfRange(review));
    }
    Ok(())
}
