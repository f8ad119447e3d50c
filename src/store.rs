//! Committed record storage.
//!
//! A [`RecordStore`] is the immutable record half of a [`Snapshot`]; writers
//! clone it, apply a transaction, and publish the result as a new snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;

use crate::mvcc::Snapshot;
use crate::record::Record;
use crate::value::RecordId;

#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    records: AHashMap<RecordId, Arc<Record>>,
    by_type: AHashMap<String, BTreeSet<RecordId>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<&Arc<Record>> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of every record of `type_name`, ascending (creation order).
    pub fn ids_of_type(&self, type_name: &str) -> Vec<RecordId> {
        self.by_type
            .get(type_name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn count_of_type(&self, type_name: &str) -> usize {
        self.by_type.get(type_name).map_or(0, BTreeSet::len)
    }

    pub fn max_id(&self) -> Option<RecordId> {
        self.records.keys().copied().max()
    }

    pub(crate) fn insert(&mut self, record: Record) {
        self.by_type
            .entry(record.type_name.clone())
            .or_default()
            .insert(record.id);
        self.records.insert(record.id, Arc::new(record));
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<Arc<Record>> {
        let removed = self.records.remove(&id)?;
        if let Some(ids) = self.by_type.get_mut(&removed.type_name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_type.remove(&removed.type_name);
            }
        }
        Some(removed)
    }
}

/// Lazy scan over one type, pinned to the snapshot current when it started.
pub struct Scan {
    snapshot: Arc<Snapshot>,
    ids: std::vec::IntoIter<RecordId>,
}

impl Scan {
    pub(crate) fn new(snapshot: Arc<Snapshot>, type_name: &str) -> Self {
        let ids = snapshot.store.ids_of_type(type_name).into_iter();
        Self { snapshot, ids }
    }
}

impl Iterator for Scan {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        self.snapshot.store.get(id).cloned()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TypeKind;
    use crate::value::Properties;

    fn doc(id: u64, ty: &str) -> Record {
        Record::new(RecordId::new(id), ty, TypeKind::Document, Properties::new())
    }

    #[test]
    fn test_ids_of_type_are_ordered_and_removal_updates_index() {
        let mut store = RecordStore::new();
        store.insert(doc(3, "User"));
        store.insert(doc(1, "User"));
        store.insert(doc(2, "Product"));
        assert_eq!(
            store.ids_of_type("User"),
            vec![RecordId::new(1), RecordId::new(3)]
        );
        store.remove(RecordId::new(1)).expect("removed");
        assert_eq!(store.ids_of_type("User"), vec![RecordId::new(3)]);
        assert_eq!(store.count_of_type("Product"), 1);
        assert!(store.remove(RecordId::new(1)).is_none());
        assert_eq!(store.max_id(), Some(RecordId::new(3)));
    }
}
