//! Staged mutations and their atomic application to a snapshot.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::errors::DocGraphError;
use crate::mvcc::Snapshot;
use crate::record::{Record, TypeKind};
use crate::value::{Properties, RecordId};

pub type TransactionId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "Idle",
            TransactionState::Active => "Active",
            TransactionState::Committed => "Committed",
            TransactionState::RolledBack => "RolledBack",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum StagedOp {
    Create(Record),
    /// `base_version` is `None` when the record was created in the same transaction.
    Update {
        id: RecordId,
        properties: Properties,
        base_version: Option<u64>,
    },
    Delete {
        id: RecordId,
        base_version: Option<u64>,
    },
}

impl StagedOp {
    fn target(&self) -> RecordId {
        match self {
            StagedOp::Create(record) => record.id,
            StagedOp::Update { id, .. } | StagedOp::Delete { id, .. } => *id,
        }
    }
}

/// Pending log of one logical transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    ops: Vec<StagedOp>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            ops: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn stage(&mut self, op: StagedOp) {
        self.ops.push(op);
    }

    pub(crate) fn into_ops(self) -> Vec<StagedOp> {
        self.ops
    }

    /// The record as this transaction sees it: committed state with staged ops replayed.
    /// An edge whose endpoint is staged for deletion is gone with it.
    pub(crate) fn view(&self, id: RecordId, committed: Option<&Record>) -> Option<Record> {
        let mut current = committed.cloned();
        for op in self.ops.iter().filter(|op| op.target() == id) {
            match op {
                StagedOp::Create(record) => current = Some(record.clone()),
                StagedOp::Update { properties, .. } => {
                    if let Some(record) = current.as_mut() {
                        record.properties = properties.clone();
                    }
                }
                StagedOp::Delete { .. } => current = None,
            }
        }
        match current.as_ref().and_then(|record| record.endpoints) {
            Some(ends) if self.deletes(ends.from) || self.deletes(ends.to) => None,
            _ => current,
        }
    }

    fn deletes(&self, id: RecordId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, StagedOp::Delete { id: target, .. } if *target == id))
    }

    /// Version a new update or delete of `id` should be checked against at commit.
    pub(crate) fn base_version(&self, id: RecordId, committed: Option<&Record>) -> Option<u64> {
        let created_here = self
            .ops
            .iter()
            .any(|op| matches!(op, StagedOp::Create(record) if record.id == id));
        if created_here {
            None
        } else {
            committed.map(|record| record.version)
        }
    }

    /// Ids of `type_name` records created by this transaction.
    pub(crate) fn created_of_type(&self, type_name: &str) -> Vec<RecordId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                StagedOp::Create(record) if record.type_name == type_name => Some(record.id),
                _ => None,
            })
            .collect()
    }
}

/// Durable effect of a commit: final state of every touched record.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub upserts: Vec<Arc<Record>>,
    pub deletes: Vec<RecordId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Validates `ops` against `base` and produces the next snapshot.
///
/// Nothing in `base` is modified; on error the caller simply drops the ops.
pub(crate) fn apply(
    base: &Snapshot,
    ops: Vec<StagedOp>,
    cascade_deletes: bool,
) -> Result<(Snapshot, ChangeSet), DocGraphError> {
    check_versions(base, &ops)?;

    let mut store = base.store.clone();
    let mut graph = base.graph.clone();
    let mut touched = BTreeSet::new();

    for op in ops {
        match op {
            StagedOp::Create(record) => {
                if let Some(ends) = record.endpoints {
                    for endpoint in [ends.from, ends.to] {
                        let is_vertex = store.get(endpoint).is_some_and(|r| r.is_vertex());
                        if !is_vertex {
                            return Err(DocGraphError::dangling(format!(
                                "edge {} ({}) references missing vertex {endpoint}",
                                record.id, record.type_name
                            )));
                        }
                    }
                    graph.link(record.id, ends.from, ends.to, &record.type_name);
                }
                touched.insert(record.id);
                store.insert(record);
            }
            StagedOp::Update { id, properties, .. } => {
                let current = store
                    .get(id)
                    .ok_or_else(|| DocGraphError::not_found(format!("record {id}")))?;
                let mut next = Record::clone(current);
                next.properties = properties;
                next.version += 1;
                touched.insert(id);
                store.insert(next);
            }
            StagedOp::Delete { id, .. } => {
                let removed = store
                    .remove(id)
                    .ok_or_else(|| DocGraphError::not_found(format!("record {id}")))?;
                touched.insert(id);
                match removed.kind {
                    TypeKind::Edge => {
                        if let Some(ends) = removed.endpoints {
                            graph.unlink(id, ends.from, ends.to, &removed.type_name);
                        }
                    }
                    TypeKind::Vertex => {
                        let incident = graph.incident_edges(id);
                        if !incident.is_empty() && !cascade_deletes {
                            return Err(DocGraphError::invalid_argument(format!(
                                "vertex {id} still has {} edge(s) and cascade deletes are disabled",
                                incident.len()
                            )));
                        }
                        for edge_id in incident {
                            if let Some(edge) = store.remove(edge_id) {
                                if let Some(ends) = edge.endpoints {
                                    graph.unlink(edge_id, ends.from, ends.to, &edge.type_name);
                                }
                                touched.insert(edge_id);
                            }
                        }
                    }
                    TypeKind::Document => {}
                }
            }
        }
    }

    let mut changes = ChangeSet::default();
    for id in touched {
        match store.get(id) {
            Some(record) => changes.upserts.push(Arc::clone(record)),
            None if base.store.contains(id) => changes.deletes.push(id),
            None => {}
        }
    }

    Ok((Snapshot::new(store, graph, base.sequence + 1), changes))
}

fn check_versions(base: &Snapshot, ops: &[StagedOp]) -> Result<(), DocGraphError> {
    for op in ops {
        let (id, expected) = match op {
            StagedOp::Update {
                id,
                base_version: Some(v),
                ..
            }
            | StagedOp::Delete {
                id,
                base_version: Some(v),
            } => (*id, *v),
            _ => continue,
        };
        match base.store.get(id) {
            Some(current) if current.version == expected => {}
            Some(current) => {
                warn!(
                    "write conflict on {id}: staged against version {expected}, committed version is {}",
                    current.version
                );
                return Err(DocGraphError::conflict(format!(
                    "record {id} was modified by another transaction"
                )));
            }
            None => {
                warn!("write conflict on {id}: record deleted by another transaction");
                return Err(DocGraphError::conflict(format!(
                    "record {id} was deleted by another transaction"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_index::Direction;
    use crate::value::Value;

    fn id(raw: u64) -> RecordId {
        RecordId::new(raw)
    }

    fn vertex(raw: u64) -> Record {
        Record::new(id(raw), "Person", TypeKind::Vertex, Properties::new())
    }

    fn named(name: &str) -> Properties {
        let mut props = Properties::new();
        props.insert("name".into(), Value::from(name));
        props
    }

    #[test]
    fn test_view_replays_staged_ops() {
        let mut tx = Transaction::new(1);
        tx.stage(StagedOp::Create(vertex(1)));
        tx.stage(StagedOp::Update {
            id: id(1),
            properties: named("Alice"),
            base_version: None,
        });
        let seen = tx.view(id(1), None).expect("visible to its own transaction");
        assert_eq!(seen.get("name"), Some(&Value::from("Alice")));

        tx.stage(StagedOp::Delete {
            id: id(1),
            base_version: None,
        });
        assert!(tx.view(id(1), None).is_none());
    }

    #[test]
    fn test_view_hides_edges_of_a_vertex_staged_for_deletion() {
        let edge = Record::new_edge(id(3), "Knows", id(1), id(2), Properties::new());
        let mut tx = Transaction::new(1);
        assert!(tx.view(id(3), Some(&edge)).is_some());
        tx.stage(StagedOp::Delete {
            id: id(2),
            base_version: Some(1),
        });
        assert!(tx.view(id(3), Some(&edge)).is_none());
        assert!(tx.view(id(1), Some(&vertex(1))).is_some());
    }

    #[test]
    fn test_apply_links_edges_atomically_with_records() {
        let base = Snapshot::empty();
        let ops = vec![
            StagedOp::Create(vertex(1)),
            StagedOp::Create(vertex(2)),
            StagedOp::Create(Record::new_edge(id(3), "Knows", id(1), id(2), Properties::new())),
        ];
        let (next, changes) = apply(&base, ops, true).expect("apply");
        assert_eq!(next.record_count(), 3);
        assert_eq!(next.graph.bucket(id(2), Direction::In, "Knows").len(), 1);
        assert_eq!(changes.upserts.len(), 3);
        assert_eq!(base.record_count(), 0);
    }

    #[test]
    fn test_apply_rejects_dangling_edge() {
        let base = Snapshot::empty();
        let ops = vec![
            StagedOp::Create(vertex(1)),
            StagedOp::Create(Record::new_edge(id(3), "Knows", id(1), id(99), Properties::new())),
        ];
        let err = apply(&base, ops, true).expect_err("dangling");
        assert!(matches!(err, DocGraphError::DanglingEndpoint(_)));
    }

    #[test]
    fn test_stale_base_version_is_a_conflict() {
        let (base, _) = apply(&Snapshot::empty(), vec![StagedOp::Create(vertex(1))], true)
            .expect("seed");
        let (bumped, _) = apply(
            &base,
            vec![StagedOp::Update {
                id: id(1),
                properties: named("first"),
                base_version: Some(1),
            }],
            true,
        )
        .expect("first update");
        let err = apply(
            &bumped,
            vec![StagedOp::Update {
                id: id(1),
                properties: named("second"),
                base_version: Some(1),
            }],
            true,
        )
        .expect_err("stale");
        assert!(matches!(err, DocGraphError::WriteConflict(_)));
    }

    #[test]
    fn test_vertex_delete_respects_cascade_policy() {
        let seed = vec![
            StagedOp::Create(vertex(1)),
            StagedOp::Create(vertex(2)),
            StagedOp::Create(Record::new_edge(id(3), "Knows", id(1), id(2), Properties::new())),
        ];
        let (base, _) = apply(&Snapshot::empty(), seed, true).expect("seed");
        let delete = || {
            vec![StagedOp::Delete {
                id: id(1),
                base_version: Some(1),
            }]
        };

        assert!(apply(&base, delete(), false).is_err());

        let (next, changes) = apply(&base, delete(), true).expect("cascade");
        assert!(!next.store.contains(id(3)));
        assert_eq!(next.graph.edge_count(), 0);
        assert_eq!(changes.deletes, vec![id(1), id(3)]);
    }
}
