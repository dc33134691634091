//! Pure top-N frequency aggregations over a book collection.

use hashbrown::HashMap;

use crate::book::BookRecord;

/// Number of entries the statistics surfaces display.
pub const DEFAULT_TOP_N: usize = 5;

/// Most frequent authors, as `(author, count)` pairs sorted by count
/// descending, ties by author ascending, truncated to at most `n`.
pub fn top_authors<'a, I>(books: I, n: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a BookRecord>,
{
    top_n(books.into_iter().map(|b| b.author_name.as_str()), n)
}

/// Most frequent categories, with the same ordering contract as
/// [`top_authors`].
pub fn top_categories<'a, I>(books: I, n: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a BookRecord>,
{
    top_n(books.into_iter().map(|b| b.category.as_str()), n)
}

fn top_n<'a>(keys: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, usize)> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        *freq.entry(key).or_insert(0) += 1;
    }

    let mut entries: Vec<(String, usize)> = freq
        .into_iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect();
    entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}
