use hashbrown::HashMap;

use crate::types::BookId;

pub type VecIndex<K> = HashMap<K, Vec<BookId>>;
