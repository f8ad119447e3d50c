//! Adjacency lists keyed by vertex, edge type and direction.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::mvcc::Snapshot;
use crate::value::RecordId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyEntry {
    pub edge: RecordId,
    pub neighbor: RecordId,
}

type Buckets = BTreeMap<String, Vec<AdjacencyEntry>>;

#[derive(Clone, Debug, Default)]
pub struct GraphIndex {
    outgoing: AHashMap<RecordId, Buckets>,
    incoming: AHashMap<RecordId, Buckets>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn link(&mut self, edge: RecordId, from: RecordId, to: RecordId, edge_type: &str) {
        insert_sorted(
            self.outgoing
                .entry(from)
                .or_default()
                .entry(edge_type.to_string())
                .or_default(),
            AdjacencyEntry { edge, neighbor: to },
        );
        insert_sorted(
            self.incoming
                .entry(to)
                .or_default()
                .entry(edge_type.to_string())
                .or_default(),
            AdjacencyEntry {
                edge,
                neighbor: from,
            },
        );
    }

    pub(crate) fn unlink(&mut self, edge: RecordId, from: RecordId, to: RecordId, edge_type: &str) {
        remove_entry(&mut self.outgoing, from, edge_type, edge);
        remove_entry(&mut self.incoming, to, edge_type, edge);
    }

    /// Entries of one (vertex, edge type, direction) bucket, ordered by edge id.
    /// `Direction::Both` is not a bucket and always yields an empty slice.
    pub fn bucket(&self, vertex: RecordId, direction: Direction, edge_type: &str) -> &[AdjacencyEntry] {
        let side = match direction {
            Direction::Out => &self.outgoing,
            Direction::In => &self.incoming,
            Direction::Both => return &[],
        };
        side.get(&vertex)
            .and_then(|buckets| buckets.get(edge_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edge types present on one side of a vertex.
    pub fn edge_types(&self, vertex: RecordId, direction: Direction) -> Vec<String> {
        let collect = |side: &AHashMap<RecordId, Buckets>| -> Vec<String> {
            side.get(&vertex)
                .map(|buckets| buckets.keys().cloned().collect())
                .unwrap_or_default()
        };
        match direction {
            Direction::Out => collect(&self.outgoing),
            Direction::In => collect(&self.incoming),
            Direction::Both => {
                let mut types = collect(&self.outgoing);
                for ty in collect(&self.incoming) {
                    if !types.contains(&ty) {
                        types.push(ty);
                    }
                }
                types
            }
        }
    }

    /// Every edge touching `vertex`, in either direction, without duplicates.
    pub fn incident_edges(&self, vertex: RecordId) -> Vec<RecordId> {
        let mut edges: Vec<RecordId> = [&self.outgoing, &self.incoming]
            .into_iter()
            .filter_map(|side| side.get(&vertex))
            .flat_map(|buckets| buckets.values().flatten().map(|entry| entry.edge))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    pub fn degree(&self, vertex: RecordId, direction: Direction) -> usize {
        let count = |side: &AHashMap<RecordId, Buckets>| {
            side.get(&vertex)
                .map_or(0, |buckets| buckets.values().map(Vec::len).sum())
        };
        match direction {
            Direction::Out => count(&self.outgoing),
            Direction::In => count(&self.incoming),
            Direction::Both => count(&self.outgoing) + count(&self.incoming),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing
            .values()
            .flat_map(|buckets| buckets.values())
            .map(Vec::len)
            .sum()
    }
}

fn insert_sorted(entries: &mut Vec<AdjacencyEntry>, entry: AdjacencyEntry) {
    match entries.binary_search_by_key(&entry.edge, |e| e.edge) {
        Ok(_) => {}
        Err(pos) => entries.insert(pos, entry),
    }
}

fn remove_entry(
    side: &mut AHashMap<RecordId, Buckets>,
    vertex: RecordId,
    edge_type: &str,
    edge: RecordId,
) {
    let Some(buckets) = side.get_mut(&vertex) else {
        return;
    };
    if let Some(entries) = buckets.get_mut(edge_type) {
        entries.retain(|entry| entry.edge != edge);
        if entries.is_empty() {
            buckets.remove(edge_type);
        }
    }
    if buckets.is_empty() {
        side.remove(&vertex);
    }
}

/// Lazy walk over a vertex's adjacency buckets within one snapshot.
pub struct Neighbors {
    snapshot: Arc<Snapshot>,
    vertex: RecordId,
    buckets: Vec<(Direction, String)>,
    bucket: usize,
    pos: usize,
}

impl Neighbors {
    pub(crate) fn new(
        snapshot: Arc<Snapshot>,
        vertex: RecordId,
        direction: Direction,
        edge_types: &[String],
    ) -> Self {
        let sides: &[Direction] = match direction {
            Direction::Out => &[Direction::Out],
            Direction::In => &[Direction::In],
            Direction::Both => &[Direction::Out, Direction::In],
        };
        let mut buckets = Vec::new();
        for &side in sides {
            if edge_types.is_empty() {
                for ty in snapshot.graph.edge_types(vertex, side) {
                    buckets.push((side, ty));
                }
            } else {
                for ty in edge_types {
                    buckets.push((side, ty.clone()));
                }
            }
        }
        Self {
            snapshot,
            vertex,
            buckets,
            bucket: 0,
            pos: 0,
        }
    }
}

impl Iterator for Neighbors {
    type Item = AdjacencyEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((direction, edge_type)) = self.buckets.get(self.bucket) {
            let entries = self.snapshot.graph.bucket(self.vertex, *direction, edge_type);
            if let Some(entry) = entries.get(self.pos) {
                self.pos += 1;
                return Some(*entry);
            }
            self.bucket += 1;
            self.pos = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> RecordId {
        RecordId::new(raw)
    }

    #[test]
    fn test_link_registers_both_directions() {
        let mut index = GraphIndex::new();
        index.link(id(10), id(1), id(2), "Knows");
        assert_eq!(
            index.bucket(id(1), Direction::Out, "Knows"),
            &[AdjacencyEntry {
                edge: id(10),
                neighbor: id(2)
            }]
        );
        assert_eq!(
            index.bucket(id(2), Direction::In, "Knows"),
            &[AdjacencyEntry {
                edge: id(10),
                neighbor: id(1)
            }]
        );
        assert_eq!(index.edge_count(), 1);
    }

    #[test]
    fn test_unlink_drops_empty_buckets() {
        let mut index = GraphIndex::new();
        index.link(id(10), id(1), id(2), "Knows");
        index.link(id(11), id(1), id(3), "WorksAt");
        index.unlink(id(10), id(1), id(2), "Knows");
        assert!(index.bucket(id(1), Direction::Out, "Knows").is_empty());
        assert_eq!(index.edge_types(id(1), Direction::Out), vec!["WorksAt"]);
        assert!(index.edge_types(id(2), Direction::In).is_empty());
        assert_eq!(index.incident_edges(id(1)), vec![id(11)]);
    }

    #[test]
    fn test_entries_stay_ordered_by_edge_id() {
        let mut index = GraphIndex::new();
        index.link(id(30), id(1), id(4), "Knows");
        index.link(id(20), id(1), id(3), "Knows");
        let edges: Vec<_> = index
            .bucket(id(1), Direction::Out, "Knows")
            .iter()
            .map(|e| e.edge)
            .collect();
        assert_eq!(edges, vec![id(20), id(30)]);
        assert_eq!(index.degree(id(1), Direction::Both), 2);
    }
}
