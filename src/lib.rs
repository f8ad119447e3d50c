//! Embedded multi-model database: documents, vertices and edges in one
//! SQLite-backed store, queried through a small SQL-like language.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod cache;
pub mod client;
pub mod config;
pub mod database;
pub mod errors;
pub mod graph_index;
pub mod mvcc;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;
mod storage;
pub mod store;
pub mod transaction;
pub mod value;

pub use crate::config::DatabaseConfig;
pub use crate::database::{CommandOutcome, Database};
pub use crate::errors::DocGraphError;
pub use crate::graph_index::{AdjacencyEntry, Direction, Neighbors};
pub use crate::query::{ResultSet, Row};
pub use crate::record::{Record, TypeDef, TypeKind};
pub use crate::store::Scan;
pub use crate::transaction::{TransactionId, TransactionState};
pub use crate::value::{Properties, RecordId, Value, properties};
