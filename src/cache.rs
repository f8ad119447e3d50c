use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::query::ParsedStatement;

/// Parsed statements keyed by their source text.
///
/// When full, the whole cache is dropped before the next insert. A capacity
/// of zero disables caching.
#[derive(Default)]
pub struct StatementCache {
    inner: RwLock<AHashMap<String, Arc<ParsedStatement>>>,
    capacity: usize,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, text: &str) -> Option<Arc<ParsedStatement>> {
        self.inner.read().get(text).cloned()
    }

    pub fn insert(&self, text: &str, statement: Arc<ParsedStatement>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.write();
        if inner.len() >= self.capacity && !inner.contains_key(text) {
            inner.clear();
        }
        inner.insert(text.to_string(), statement);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
