//! Public database handle.
//!
//! A [`Database`] is one session over a shared engine. Every session owns at
//! most one active transaction; all sessions read the same published
//! snapshot and commit through the same writer lock.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};

use crate::cache::StatementCache;
use crate::config::DatabaseConfig;
use crate::errors::DocGraphError;
use crate::graph_index::{Direction, GraphIndex, Neighbors};
use crate::mvcc::{Snapshot, SnapshotManager};
use crate::query::ast::{Condition, Projection, SelectQuery, Statement};
use crate::query::eval::{Scope, eval_condition, eval_expr};
use crate::query::exec::execute;
use crate::query::{ParsedStatement, ResultSet, Row, parse};
use crate::record::{Record, TypeDef, TypeKind};
use crate::registry::TypeRegistry;
use crate::storage::Storage;
use crate::store::{RecordStore, Scan};
use crate::transaction::{StagedOp, Transaction, TransactionId, TransactionState, apply};
use crate::value::{Properties, RecordId, Value, check_properties, check_storable};

/// Result of [`Database::command`].
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    TypeDeclared { created: bool },
    Updated(usize),
    Deleted(usize),
    Rows(Vec<Row>),
}

struct Engine {
    config: DatabaseConfig,
    /// Doubles as the writer lock; `None` once closed.
    storage: Mutex<Option<Storage>>,
    snapshots: SnapshotManager,
    registry: TypeRegistry,
    statements: StatementCache,
    next_record_id: AtomicU64,
    next_tx_id: AtomicU64,
    closed: AtomicBool,
}

impl Engine {
    fn load(storage: Storage, config: DatabaseConfig) -> Result<Self, DocGraphError> {
        let types = storage.load_types()?;
        let records = storage.load_records()?;
        let mut store = RecordStore::new();
        let mut graph = GraphIndex::new();
        for record in records {
            if let Some(ends) = record.endpoints {
                graph.link(record.id, ends.from, ends.to, &record.type_name);
            }
            store.insert(record);
        }
        let after_max = store.max_id().map_or(1, |id| id.as_u64() + 1);
        let next_id = storage.load_next_id()?.unwrap_or(1).max(after_max);
        info!(
            "loaded {} type(s) and {} record(s), next record id {next_id}",
            types.len(),
            store.len()
        );
        Ok(Self {
            statements: StatementCache::new(config.statement_cache_capacity),
            config,
            storage: Mutex::new(Some(storage)),
            snapshots: SnapshotManager::new(Snapshot::new(store, graph, 0)),
            registry: TypeRegistry::from_defs(types),
            next_record_id: AtomicU64::new(next_id),
            next_tx_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), DocGraphError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DocGraphError::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> Result<(), DocGraphError> {
        self.ensure_open()?;
        if self.config.read_only {
            Err(DocGraphError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, Option<Storage>>, DocGraphError> {
        let guard = self
            .storage
            .try_lock_for(self.config.lock_timeout)
            .ok_or_else(|| {
                DocGraphError::timeout(format!(
                    "writer lock not acquired within {:?}",
                    self.config.lock_timeout
                ))
            })?;
        if guard.is_none() {
            return Err(DocGraphError::DatabaseClosed);
        }
        Ok(guard)
    }

    fn allocate_id(&self) -> RecordId {
        RecordId::new(self.next_record_id.fetch_add(1, Ordering::SeqCst))
    }

    fn parse(&self, text: &str) -> Result<Arc<ParsedStatement>, DocGraphError> {
        if let Some(cached) = self.statements.get(text) {
            return Ok(cached);
        }
        let parsed = Arc::new(parse(text)?);
        self.statements.insert(text, Arc::clone(&parsed));
        Ok(parsed)
    }

    fn declare_type(&self, name: &str, kind: TypeKind) -> Result<bool, DocGraphError> {
        let guard = self.lock_storage()?;
        let Some(storage) = guard.as_ref() else {
            return Err(DocGraphError::DatabaseClosed);
        };
        let created = self.registry.declare(name, kind)?;
        if created {
            let def = TypeDef {
                name: name.to_string(),
                kind,
            };
            if let Err(err) = storage.insert_type(&def) {
                self.registry.forget(name);
                return Err(err);
            }
            info!("declared {kind} type {name}");
        }
        Ok(created)
    }

    /// Validates `ops` against the latest snapshot, persists, then publishes.
    fn commit(&self, tx_id: TransactionId, ops: Vec<StagedOp>) -> Result<(), DocGraphError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock_storage()?;
        let Some(storage) = guard.as_mut() else {
            return Err(DocGraphError::DatabaseClosed);
        };
        let staged = ops.len();
        let base = self.snapshots.acquire();
        let (next, changes) = apply(&base, ops, self.config.cascade_deletes)?;
        storage.persist(&changes, self.next_record_id.load(Ordering::SeqCst))?;
        debug!(
            "transaction {tx_id} committed {staged} op(s): {} upsert(s), {} delete(s), snapshot {}",
            changes.upserts.len(),
            changes.deletes.len(),
            next.sequence
        );
        self.snapshots.publish(next);
        Ok(())
    }

    fn close(&self) -> Result<(), DocGraphError> {
        let mut guard = self.lock_storage()?;
        self.closed.store(true, Ordering::Release);
        guard.take();
        self.statements.clear();
        info!("database closed");
        Ok(())
    }
}

#[derive(Debug)]
struct SessionState {
    tx: Option<Transaction>,
    /// Committed state the active transaction reads from, pinned at `begin`.
    view: Option<Arc<Snapshot>>,
    last: TransactionState,
}

impl SessionState {
    fn finish(&mut self, state: TransactionState) -> Option<Transaction> {
        self.view = None;
        self.last = state;
        self.tx.take()
    }
}

/// Handle to an open database. Cheap to [`Database::session`] into more
/// handles; each carries its own transaction slot.
pub struct Database {
    engine: Arc<Engine>,
    session: Mutex<SessionState>,
}

impl Database {
    /// Opens (or creates, see [`DatabaseConfig::auto_create`]) a file database.
    pub fn open<P: AsRef<Path>>(path: P, config: &DatabaseConfig) -> Result<Self, DocGraphError> {
        let path = path.as_ref();
        let storage = Storage::open(path, config)?;
        info!("opened {}", path.display());
        Ok(Self::from_engine(Arc::new(Engine::load(storage, config.clone())?)))
    }

    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self, DocGraphError> {
        let storage = Storage::open_in_memory()?;
        Ok(Self::from_engine(Arc::new(Engine::load(storage, config.clone())?)))
    }

    fn from_engine(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            session: Mutex::new(SessionState {
                tx: None,
                view: None,
                last: TransactionState::Idle,
            }),
        }
    }

    /// A new handle on the same database with its own transaction slot.
    pub fn session(&self) -> Self {
        Self::from_engine(Arc::clone(&self.engine))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.engine.config
    }

    pub fn is_closed(&self) -> bool {
        self.engine.closed.load(Ordering::Acquire)
    }

    // Transactions

    pub fn begin(&self) -> Result<TransactionId, DocGraphError> {
        self.engine.ensure_open()?;
        let mut session = self.session.lock();
        if session.tx.is_some() {
            return Err(DocGraphError::TransactionAlreadyActive);
        }
        let id = self.engine.next_tx_id.fetch_add(1, Ordering::SeqCst);
        session.tx = Some(Transaction::new(id));
        session.view = Some(self.engine.snapshots.acquire());
        session.last = TransactionState::Active;
        debug!("transaction {id} started");
        Ok(id)
    }

    /// Commits the active transaction. Any failure rolls it back and is returned.
    pub fn commit(&self) -> Result<(), DocGraphError> {
        self.engine.ensure_open()?;
        let mut session = self.session.lock();
        let tx = session
            .finish(TransactionState::Committed)
            .ok_or(DocGraphError::NoActiveTransaction)?;
        let id = tx.id();
        self.engine.commit(id, tx.into_ops()).inspect_err(|err| {
            session.last = TransactionState::RolledBack;
            debug!("transaction {id} rolled back: {err}");
        })
    }

    pub fn rollback(&self) -> Result<(), DocGraphError> {
        self.engine.ensure_open()?;
        let mut session = self.session.lock();
        let tx = session
            .finish(TransactionState::RolledBack)
            .ok_or(DocGraphError::NoActiveTransaction)?;
        debug!("transaction {} rolled back, {} op(s) discarded", tx.id(), tx.len());
        Ok(())
    }

    pub fn transaction_state(&self) -> TransactionState {
        let session = self.session.lock();
        if session.tx.is_some() {
            TransactionState::Active
        } else {
            session.last
        }
    }

    // Types

    /// Declares a type; `Ok(false)` when it already exists with the same kind.
    pub fn declare_type(&self, name: &str, kind: TypeKind) -> Result<bool, DocGraphError> {
        self.engine.ensure_open()?;
        if self.engine.registry.kind_of(name) == Some(kind) {
            return Ok(false);
        }
        self.engine.ensure_writable()?;
        self.engine.declare_type(name, kind)
    }

    pub fn type_exists(&self, name: &str) -> Result<bool, DocGraphError> {
        self.engine.ensure_open()?;
        Ok(self.engine.registry.exists(name))
    }

    pub fn types(&self) -> Result<Vec<TypeDef>, DocGraphError> {
        self.engine.ensure_open()?;
        Ok(self.engine.registry.list())
    }

    // Records

    pub fn create_record(
        &self,
        type_name: &str,
        properties: Properties,
    ) -> Result<RecordId, DocGraphError> {
        self.engine.ensure_writable()?;
        let kind = self.engine.registry.require(type_name)?;
        if kind == TypeKind::Edge {
            return Err(DocGraphError::invalid_argument(format!(
                "{type_name} is an edge type; use create_edge"
            )));
        }
        check_properties(&properties)?;
        self.with_active(|_, tx| {
            let id = self.engine.allocate_id();
            tx.stage(StagedOp::Create(Record::new(id, type_name, kind, properties)));
            Ok(id)
        })
    }

    /// Stages an edge; its endpoints are checked when the transaction commits.
    pub fn create_edge(
        &self,
        edge_type: &str,
        from: RecordId,
        to: RecordId,
        properties: Properties,
    ) -> Result<RecordId, DocGraphError> {
        self.engine.ensure_writable()?;
        let kind = self.engine.registry.require(edge_type)?;
        if kind != TypeKind::Edge {
            return Err(DocGraphError::invalid_argument(format!(
                "{edge_type} is a {kind} type, not an edge type"
            )));
        }
        check_properties(&properties)?;
        self.with_active(|_, tx| {
            let id = self.engine.allocate_id();
            tx.stage(StagedOp::Create(Record::new_edge(
                id, edge_type, from, to, properties,
            )));
            Ok(id)
        })
    }

    /// Reads a record. Inside a transaction this is the state the transaction
    /// started from plus its own uncommitted writes.
    pub fn get(&self, id: RecordId) -> Result<Record, DocGraphError> {
        self.engine.ensure_open()?;
        let session = self.session.lock();
        let snapshot = self.read_view(&session);
        let committed = snapshot.store.get(id).map(|record| &**record);
        let found = match session.tx.as_ref() {
            Some(tx) => tx.view(id, committed),
            None => committed.cloned(),
        };
        found.ok_or_else(|| DocGraphError::not_found(format!("record {id}")))
    }

    /// Replaces every property of a record.
    pub fn update(&self, id: RecordId, properties: Properties) -> Result<(), DocGraphError> {
        self.engine.ensure_writable()?;
        check_properties(&properties)?;
        self.with_active(|snapshot, tx| {
            let committed = snapshot.store.get(id).map(|record| &**record);
            if tx.view(id, committed).is_none() {
                return Err(DocGraphError::not_found(format!("record {id}")));
            }
            let base_version = tx.base_version(id, committed);
            tx.stage(StagedOp::Update {
                id,
                properties,
                base_version,
            });
            Ok(())
        })
    }

    /// Shallow-merges `properties` into the record; given keys win.
    pub fn merge(&self, id: RecordId, properties: Properties) -> Result<(), DocGraphError> {
        self.engine.ensure_writable()?;
        check_properties(&properties)?;
        self.with_active(|snapshot, tx| {
            let committed = snapshot.store.get(id).map(|record| &**record);
            let mut merged = tx
                .view(id, committed)
                .ok_or_else(|| DocGraphError::not_found(format!("record {id}")))?
                .properties;
            merged.extend(properties);
            let base_version = tx.base_version(id, committed);
            tx.stage(StagedOp::Update {
                id,
                properties: merged,
                base_version,
            });
            Ok(())
        })
    }

    pub fn delete(&self, id: RecordId) -> Result<(), DocGraphError> {
        self.engine.ensure_writable()?;
        self.with_active(|snapshot, tx| {
            let committed = snapshot.store.get(id).map(|record| &**record);
            if tx.view(id, committed).is_none() {
                return Err(DocGraphError::not_found(format!("record {id}")));
            }
            let base_version = tx.base_version(id, committed);
            tx.stage(StagedOp::Delete { id, base_version });
            Ok(())
        })
    }

    /// Committed records of one type, pinned to the snapshot current now.
    pub fn scan(&self, type_name: &str) -> Result<Scan, DocGraphError> {
        self.engine.ensure_open()?;
        self.engine.registry.require(type_name)?;
        Ok(Scan::new(self.engine.snapshots.acquire(), type_name))
    }

    // Graph

    pub fn out_neighbors(
        &self,
        vertex: RecordId,
        edge_type: &str,
    ) -> Result<Neighbors, DocGraphError> {
        self.neighbors(vertex, Direction::Out, Some(edge_type))
    }

    pub fn in_neighbors(
        &self,
        vertex: RecordId,
        edge_type: &str,
    ) -> Result<Neighbors, DocGraphError> {
        self.neighbors(vertex, Direction::In, Some(edge_type))
    }

    /// Committed adjacency of `vertex`; every edge type when `edge_type` is `None`.
    pub fn neighbors(
        &self,
        vertex: RecordId,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Neighbors, DocGraphError> {
        self.engine.ensure_open()?;
        let edge_types = match edge_type {
            Some(name) => {
                self.engine.registry.require(name)?;
                vec![name.to_string()]
            }
            None => Vec::new(),
        };
        let snapshot = self.engine.snapshots.acquire();
        if !snapshot.store.get(vertex).is_some_and(|r| r.is_vertex()) {
            return Err(DocGraphError::not_found(format!("vertex {vertex}")));
        }
        Ok(Neighbors::new(snapshot, vertex, direction, &edge_types))
    }

    // Queries and commands

    /// Runs a SELECT against the committed snapshot.
    pub fn query(&self, text: &str, params: &[Value]) -> Result<ResultSet, DocGraphError> {
        self.engine.ensure_open()?;
        let parsed = self.engine.parse(text)?;
        match &parsed.statement {
            Statement::Select(query) => self.select(query, parsed.param_count, params),
            _ => Err(DocGraphError::invalid_argument(
                "query only runs SELECT statements; use command",
            )),
        }
    }

    /// Runs any statement. UPDATE and DELETE join the active transaction, or
    /// commit on their own when none is active.
    pub fn command(&self, text: &str, params: &[Value]) -> Result<CommandOutcome, DocGraphError> {
        self.engine.ensure_open()?;
        let parsed = self.engine.parse(text)?;
        check_params(parsed.param_count, params)?;
        match &parsed.statement {
            Statement::Select(query) => {
                let rows = self.select(query, parsed.param_count, params)?;
                Ok(CommandOutcome::Rows(rows.collect()))
            }
            Statement::CreateType {
                name,
                kind,
                if_not_exists,
            } => {
                let created = self.declare_type(name, *kind)?;
                if !created && !*if_not_exists {
                    return Err(DocGraphError::type_conflict(format!(
                        "type {name} already exists"
                    )));
                }
                Ok(CommandOutcome::TypeDeclared { created })
            }
            Statement::Update {
                type_name,
                assignments,
                filter,
            } => {
                self.engine.ensure_writable()?;
                self.engine.registry.require(type_name)?;
                let updated = self.in_transaction(|snapshot, tx| {
                    let mut ops = Vec::new();
                    for (record, committed) in visible_records(snapshot, tx, type_name) {
                        let scope = Scope::single(type_name, &record);
                        if !matches_filter(filter.as_ref(), &scope, params) {
                            continue;
                        }
                        let mut properties = record.properties.clone();
                        for (field, expr) in assignments {
                            let value = eval_expr(expr, &scope, params)?;
                            check_storable(&value)?;
                            properties.insert(field.clone(), value);
                        }
                        ops.push(StagedOp::Update {
                            id: record.id,
                            properties,
                            base_version: tx.base_version(record.id, committed.as_deref()),
                        });
                    }
                    Ok(ops)
                })?;
                Ok(CommandOutcome::Updated(updated))
            }
            Statement::Delete { type_name, filter } => {
                self.engine.ensure_writable()?;
                self.engine.registry.require(type_name)?;
                let deleted = self.in_transaction(|snapshot, tx| {
                    let mut ops = Vec::new();
                    for (record, committed) in visible_records(snapshot, tx, type_name) {
                        let scope = Scope::single(type_name, &record);
                        if matches_filter(filter.as_ref(), &scope, params) {
                            ops.push(StagedOp::Delete {
                                id: record.id,
                                base_version: tx.base_version(record.id, committed.as_deref()),
                            });
                        }
                    }
                    Ok(ops)
                })?;
                Ok(CommandOutcome::Deleted(deleted))
            }
        }
    }

    /// Closes the database for every session. Uncommitted work is discarded.
    pub fn close(&self) -> Result<(), DocGraphError> {
        self.engine.ensure_open()?;
        if let Some(tx) = self.session.lock().finish(TransactionState::RolledBack) {
            debug!("transaction {} discarded by close", tx.id());
        }
        self.engine.close()
    }

    fn select(
        &self,
        query: &SelectQuery,
        param_count: usize,
        params: &[Value],
    ) -> Result<ResultSet, DocGraphError> {
        check_params(param_count, params)?;
        self.engine.registry.require(&query.from.type_name)?;
        if let Some(join) = &query.join {
            self.engine.registry.require(&join.source.type_name)?;
        }
        if let Projection::Expand(traversal) = &query.projection {
            for edge_type in &traversal.edge_types {
                self.engine.registry.require(edge_type)?;
            }
        }
        execute(
            self.engine.snapshots.acquire(),
            query.clone(),
            params.to_vec(),
        )
    }

    fn read_view(&self, session: &SessionState) -> Arc<Snapshot> {
        match &session.view {
            Some(view) => Arc::clone(view),
            None => self.engine.snapshots.acquire(),
        }
    }

    fn with_active<R>(
        &self,
        f: impl FnOnce(&Snapshot, &mut Transaction) -> Result<R, DocGraphError>,
    ) -> Result<R, DocGraphError> {
        let mut session = self.session.lock();
        let snapshot = self.read_view(&session);
        let tx = session
            .tx
            .as_mut()
            .ok_or(DocGraphError::NoActiveTransaction)?;
        f(snapshot.as_ref(), tx)
    }

    /// Stages the ops built by `f` all at once, in the active transaction or
    /// in an implicit one that is committed here. Returns the op count.
    fn in_transaction(
        &self,
        f: impl FnOnce(&Snapshot, &Transaction) -> Result<Vec<StagedOp>, DocGraphError>,
    ) -> Result<usize, DocGraphError> {
        let mut session = self.session.lock();
        let snapshot = self.read_view(&session);
        if let Some(tx) = session.tx.as_mut() {
            let ops = f(snapshot.as_ref(), &*tx)?;
            let count = ops.len();
            for op in ops {
                tx.stage(op);
            }
            return Ok(count);
        }
        let mut tx = Transaction::new(self.engine.next_tx_id.fetch_add(1, Ordering::SeqCst));
        let ops = f(snapshot.as_ref(), &tx)?;
        let count = ops.len();
        for op in ops {
            tx.stage(op);
        }
        let id = tx.id();
        self.engine.commit(id, tx.into_ops())?;
        session.last = TransactionState::Committed;
        Ok(count)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("closed", &self.is_closed())
            .field("state", &self.transaction_state())
            .finish_non_exhaustive()
    }
}

fn check_params(expected: usize, given: &[Value]) -> Result<(), DocGraphError> {
    if given.len() < expected {
        return Err(DocGraphError::invalid_argument(format!(
            "statement has {expected} placeholder(s) but {} parameter(s) were given",
            given.len()
        )));
    }
    Ok(())
}

/// Records of `type_name` as `tx` sees them, each with its committed version if any.
fn visible_records(
    snapshot: &Snapshot,
    tx: &Transaction,
    type_name: &str,
) -> Vec<(Record, Option<Arc<Record>>)> {
    snapshot
        .store
        .ids_of_type(type_name)
        .into_iter()
        .chain(tx.created_of_type(type_name))
        .filter_map(|id| {
            let committed = snapshot.store.get(id).cloned();
            tx.view(id, committed.as_deref())
                .filter(|record| record.type_name == type_name)
                .map(|record| (record, committed))
        })
        .collect()
}

fn matches_filter(
    filter: Option<&Condition>,
    scope: &Scope<'_>,
    params: &[Value],
) -> bool {
    filter.is_none_or(|condition| eval_condition(condition, scope, params).unwrap_or(false))
}
