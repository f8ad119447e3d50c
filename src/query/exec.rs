//! SELECT execution over one committed snapshot.
//!
//! Rows stream lazily from a type scan through the pushed-down filter, the
//! nested-loop join, the remaining filter and projection. Aggregation and
//! ORDER BY need every input row and materialize; LIMIT is applied last.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;

use crate::errors::DocGraphError;
use crate::graph_index::Neighbors;
use crate::mvcc::Snapshot;
use crate::record::Record;
use crate::value::{RecordId, Value};

use super::ast::{
    AggregateFn, CompareOp, Condition, Expr, OrderKey, Projection, ProjectionItem, SelectQuery,
    Traversal,
};
use super::eval::{Binding, FieldSource, Scope, compare, eval_condition, eval_expr};
use super::result::{ResultSet, Row};

type Tuple = (Arc<Record>, Option<Arc<Record>>);

/// Resolves every field to null; used for expressions evaluated before any row exists.
struct NoFields;

impl FieldSource for NoFields {
    fn resolve(&self, _path: &[String]) -> Value {
        Value::Null
    }
}

/// A query with its WHERE clause split around the join.
struct Plan {
    query: SelectQuery,
    left_filter: Option<Condition>,
    post_filter: Option<Condition>,
}

impl Plan {
    fn new(query: SelectQuery) -> Self {
        let Some(filter) = query.filter.clone() else {
            return Self {
                query,
                left_filter: None,
                post_filter: None,
            };
        };
        if query.join.is_none() {
            return Self {
                query,
                left_filter: Some(filter),
                post_filter: None,
            };
        }
        let (pushed, rest): (Vec<_>, Vec<_>) = filter
            .into_conjuncts()
            .into_iter()
            .partition(|part| only_left(part, &query.from.type_name, query.from.binding_name()));
        Self {
            left_filter: Condition::conjoin(pushed),
            post_filter: Condition::conjoin(rest),
            query,
        }
    }

    fn scope<'a>(&'a self, left: &'a Record, right: Option<&'a Record>) -> Scope<'a> {
        Scope {
            left: Binding {
                name: self.query.from.binding_name(),
                record: left,
            },
            right: self.query.join.as_ref().zip(right).map(|(join, record)| Binding {
                name: join.source.binding_name(),
                record,
            }),
        }
    }
}

/// True when every field in `condition` is qualified with the left source.
/// Unqualified names are ambiguous under a join and stay after it.
fn only_left(condition: &Condition, type_name: &str, alias: &str) -> bool {
    let mut left_only = true;
    condition.visit_exprs(&mut |expr| {
        if !expr_only_left(expr, type_name, alias) {
            left_only = false;
        }
    });
    left_only
}

fn expr_only_left(expr: &Expr, type_name: &str, alias: &str) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Param(_) => true,
        Expr::Field(path) => {
            path.len() > 1 && (path[0] == alias || path[0] == type_name)
        }
        Expr::Map(entries) => entries
            .iter()
            .all(|(_, value)| expr_only_left(value, type_name, alias)),
        Expr::List(items) => items
            .iter()
            .all(|item| expr_only_left(item, type_name, alias)),
        Expr::Concat(a, b) => {
            expr_only_left(a, type_name, alias) && expr_only_left(b, type_name, alias)
        }
    }
}

/// A predicate that fails to evaluate does not match.
fn passes<S: FieldSource>(condition: Option<&Condition>, source: &S, params: &[Value]) -> bool {
    match condition {
        None => true,
        Some(condition) => eval_condition(condition, source, params).unwrap_or_else(|err| {
            log::debug!("predicate evaluation failed: {err}");
            false
        }),
    }
}

/// Runs `query` against `snapshot`. The caller has checked that the source
/// types exist and that `params` has one value per placeholder.
pub(crate) fn execute(
    snapshot: Arc<Snapshot>,
    query: SelectQuery,
    params: Vec<Value>,
) -> Result<ResultSet, DocGraphError> {
    let params: Arc<[Value]> = params.into();
    let limit = match &query.limit {
        Some(expr) => Some(eval_limit(expr, &params)?),
        None => None,
    };
    if matches!(query.projection, Projection::Expand(_)) && query.is_aggregate() {
        return Err(DocGraphError::invalid_argument(
            "GROUP BY cannot be combined with an expand projection",
        ));
    }

    let plan = Arc::new(Plan::new(query));
    let tuples = Tuples::new(Arc::clone(&snapshot), Arc::clone(&plan), Arc::clone(&params));

    if plan.query.is_aggregate() {
        let mut rows = aggregate(&plan, tuples, &params)?;
        if !plan.query.order_by.is_empty() {
            let keyed = rows
                .into_iter()
                .map(|row| (sort_keys(&plan.query.order_by, &row, &params), row))
                .collect();
            rows = sorted(keyed, &plan.query.order_by);
        }
        return Ok(finish(rows, limit));
    }

    if let Projection::Expand(traversal) = &plan.query.projection {
        let expanded = Expanded {
            tuples,
            snapshot,
            traversal: traversal.clone(),
            current: None,
        };
        if plan.query.order_by.is_empty() {
            let rows = expanded.map(|record| Row::from_record(&record));
            return Ok(limited(rows, limit));
        }
        let keyed = expanded
            .map(|record| {
                let scope = Scope::single(&record.type_name, &record);
                let keys = sort_keys(&plan.query.order_by, &scope, &params);
                (keys, Row::from_record(&record))
            })
            .collect();
        return Ok(finish(sorted(keyed, &plan.query.order_by), limit));
    }

    if plan.query.order_by.is_empty() {
        let rows = tuples.map(move |(left, right)| project(&plan, &left, right.as_deref(), &params));
        return Ok(limited(rows, limit));
    }
    let keyed = tuples
        .map(|(left, right)| {
            let scope = plan.scope(&left, right.as_deref());
            let keys = sort_keys(&plan.query.order_by, &scope, &params);
            (keys, project(&plan, &left, right.as_deref(), &params))
        })
        .collect();
    Ok(finish(sorted(keyed, &plan.query.order_by), limit))
}

fn eval_limit(expr: &Expr, params: &[Value]) -> Result<usize, DocGraphError> {
    match eval_expr(expr, &NoFields, params)? {
        Value::Int(n) if n >= 0 => Ok(n as usize),
        other => Err(DocGraphError::invalid_argument(format!(
            "LIMIT must be a non-negative integer, got {other}"
        ))),
    }
}

fn limited<I>(rows: I, limit: Option<usize>) -> ResultSet
where
    I: Iterator<Item = Row> + Send + 'static,
{
    match limit {
        Some(n) => ResultSet::new(rows.take(n)),
        None => ResultSet::new(rows),
    }
}

fn finish(mut rows: Vec<Row>, limit: Option<usize>) -> ResultSet {
    if let Some(n) = limit {
        rows.truncate(n);
    }
    ResultSet::from_rows(rows)
}

fn sort_keys<S: FieldSource>(order_by: &[OrderKey], source: &S, params: &[Value]) -> Vec<Value> {
    order_by
        .iter()
        .map(|key| eval_expr(&key.expr, source, params).unwrap_or(Value::Null))
        .collect()
}

fn sorted(mut keyed: Vec<(Vec<Value>, Row)>, order_by: &[OrderKey]) -> Vec<Row> {
    keyed.sort_by(|(a, _), (b, _)| {
        for ((left, right), key) in a.iter().zip(b).zip(order_by) {
            let ordering = left.sort_cmp(right);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

fn project(plan: &Plan, left: &Record, right: Option<&Record>, params: &[Value]) -> Row {
    match &plan.query.projection {
        Projection::Items(items) => {
            let scope = plan.scope(left, right);
            let mut row = Row::new(Some(left.id));
            for (index, item) in items.iter().enumerate() {
                if let ProjectionItem::Expr { expr, .. } = item {
                    let value = eval_expr(expr, &scope, params).unwrap_or(Value::Null);
                    row.push(item.column_name(index), value);
                }
            }
            row
        }
        // Expand is handled before projection; both fall back to every field.
        Projection::All | Projection::Expand(_) => {
            let mut row = Row::from_record(left);
            if let Some(right) = right {
                for (name, value) in &right.properties {
                    row.push_absent(name, value);
                }
            }
            row
        }
    }
}

/// Left records that pass the pushed-down filter, paired with each matching
/// right record when the query joins.
struct Tuples {
    snapshot: Arc<Snapshot>,
    plan: Arc<Plan>,
    params: Arc<[Value]>,
    left_ids: std::vec::IntoIter<RecordId>,
    right_ids: Option<Vec<RecordId>>,
    current: Option<(Arc<Record>, usize)>,
}

impl Tuples {
    fn new(snapshot: Arc<Snapshot>, plan: Arc<Plan>, params: Arc<[Value]>) -> Self {
        let left_ids = snapshot
            .store
            .ids_of_type(&plan.query.from.type_name)
            .into_iter();
        let right_ids = plan
            .query
            .join
            .as_ref()
            .map(|join| snapshot.store.ids_of_type(&join.source.type_name));
        Self {
            snapshot,
            plan,
            params,
            left_ids,
            right_ids,
            current: None,
        }
    }

    fn next_left(&mut self) -> Option<Arc<Record>> {
        for id in self.left_ids.by_ref() {
            let Some(record) = self.snapshot.store.get(id) else {
                continue;
            };
            let scope = self.plan.scope(record, None);
            if passes(self.plan.left_filter.as_ref(), &scope, &self.params) {
                return Some(Arc::clone(record));
            }
        }
        None
    }

    fn next_match(&mut self) -> Option<Tuple> {
        let join = self.plan.query.join.as_ref()?;
        let right_ids = self.right_ids.as_ref()?;
        let (left, pos) = self.current.as_mut()?;
        while let Some(&id) = right_ids.get(*pos) {
            *pos += 1;
            let Some(right) = self.snapshot.store.get(id) else {
                continue;
            };
            let scope = self.plan.scope(left, Some(&**right));
            let joined = match (
                eval_expr(&join.left, &scope, &self.params),
                eval_expr(&join.right, &scope, &self.params),
            ) {
                (Ok(a), Ok(b)) => compare(&a, CompareOp::Eq, &b),
                _ => false,
            };
            if joined && passes(self.plan.post_filter.as_ref(), &scope, &self.params) {
                return Some((Arc::clone(left), Some(Arc::clone(right))));
            }
        }
        None
    }
}

impl Iterator for Tuples {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.right_ids.is_none() {
                return self.next_left().map(|record| (record, None));
            }
            if self.current.is_none() {
                let left = self.next_left()?;
                self.current = Some((left, 0));
            }
            if let Some(tuple) = self.next_match() {
                return Some(tuple);
            }
            self.current = None;
        }
    }
}

/// Neighbor records of each origin tuple, in adjacency order.
struct Expanded {
    tuples: Tuples,
    snapshot: Arc<Snapshot>,
    traversal: Traversal,
    current: Option<Neighbors>,
}

impl Iterator for Expanded {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(neighbors) = self.current.as_mut() {
                for entry in neighbors.by_ref() {
                    if let Some(record) = self.snapshot.store.get(entry.neighbor) {
                        return Some(Arc::clone(record));
                    }
                }
                self.current = None;
            }
            let (origin, _) = self.tuples.next()?;
            self.current = Some(Neighbors::new(
                Arc::clone(&self.snapshot),
                origin.id,
                self.traversal.direction,
                &self.traversal.edge_types,
            ));
        }
    }
}

enum Accumulator {
    Count(i64),
    Sum { total: Value },
    Avg { total: f64, count: u64 },
    Min(Value),
    Max(Value),
}

impl Accumulator {
    fn new(func: AggregateFn) -> Self {
        match func {
            AggregateFn::Count => Accumulator::Count(0),
            AggregateFn::Sum => Accumulator::Sum { total: Value::Null },
            AggregateFn::Avg => Accumulator::Avg {
                total: 0.0,
                count: 0,
            },
            AggregateFn::Min => Accumulator::Min(Value::Null),
            AggregateFn::Max => Accumulator::Max(Value::Null),
        }
    }

    /// `None` stands for the `*` of `COUNT(*)`. Nulls are skipped everywhere else.
    fn update(&mut self, value: Option<Value>) -> Result<(), DocGraphError> {
        let value = match value {
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                }
                return Ok(());
            }
            Some(Value::Null) => return Ok(()),
            Some(value) => value,
        };
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum { total } => {
                let next = numeric(&value, "SUM")?;
                *total = match (&*total, next) {
                    (Value::Null, next) => next,
                    (Value::Int(a), Value::Int(b)) => match a.checked_add(b) {
                        Some(sum) => Value::Int(sum),
                        None => Value::Float(*a as f64 + b as f64),
                    },
                    (current, next) => Value::Float(
                        current.as_f64().unwrap_or_default() + next.as_f64().unwrap_or_default(),
                    ),
                };
            }
            Accumulator::Avg { total, count } => {
                *total += numeric(&value, "AVG")?.as_f64().unwrap_or_default();
                *count += 1;
            }
            Accumulator::Min(current) => {
                if current.is_null() || value.sort_cmp(current) == Ordering::Less {
                    *current = value;
                }
            }
            Accumulator::Max(current) => {
                if current.is_null() || value.sort_cmp(current) == Ordering::Greater {
                    *current = value;
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int(n),
            Accumulator::Sum { total } => total,
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { total, count } => Value::Float(total / count as f64),
            Accumulator::Min(value) | Accumulator::Max(value) => value,
        }
    }
}

fn numeric(value: &Value, func: &str) -> Result<Value, DocGraphError> {
    if value.is_numeric() {
        Ok(value.clone())
    } else {
        Err(DocGraphError::invalid_argument(format!(
            "{func} over non-numeric value of type {}",
            value.type_name()
        )))
    }
}

/// Integral floats group with the equal int, as `=` treats them.
fn group_key(value: Value) -> Value {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Value::Int(f as i64)
        }
        Value::List(items) => Value::List(items.into_iter().map(group_key).collect()),
        Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, group_key(v))).collect()),
        other => other,
    }
}

struct Group {
    /// Values of the plain projection items, taken from the first tuple of the group.
    first: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

/// Folds every tuple into its group. Without GROUP BY there is exactly one
/// group, even over no input, so COUNT(*) of nothing is a row holding 0.
fn aggregate<I>(plan: &Plan, tuples: I, params: &[Value]) -> Result<Vec<Row>, DocGraphError>
where
    I: Iterator<Item = Tuple>,
{
    let items: &[ProjectionItem] = match &plan.query.projection {
        Projection::Items(items) => items,
        _ => &[],
    };
    let new_group = || Group {
        first: Vec::new(),
        accumulators: items
            .iter()
            .filter_map(|item| match item {
                ProjectionItem::Aggregate { func, .. } => Some(Accumulator::new(*func)),
                ProjectionItem::Expr { .. } => None,
            })
            .collect(),
    };

    let mut index: AHashMap<String, usize> = AHashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    if plan.query.group_by.is_empty() {
        groups.push(new_group());
    }

    for (left, right) in tuples {
        let scope = plan.scope(&left, right.as_deref());
        let slot = if plan.query.group_by.is_empty() {
            0
        } else {
            let key: Vec<Value> = plan
                .query
                .group_by
                .iter()
                .map(|expr| group_key(eval_expr(expr, &scope, params).unwrap_or(Value::Null)))
                .collect();
            let key = serde_json::to_string(&key)?;
            match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    groups.push(new_group());
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            }
        };
        let group = &mut groups[slot];
        let first_tuple = group.first.is_empty();
        let mut accumulators = group.accumulators.iter_mut();
        for item in items {
            match item {
                ProjectionItem::Expr { expr, .. } => {
                    if first_tuple {
                        group
                            .first
                            .push(eval_expr(expr, &scope, params).unwrap_or(Value::Null));
                    }
                }
                ProjectionItem::Aggregate { arg, .. } => {
                    let value = match arg {
                        Some(expr) => Some(eval_expr(expr, &scope, params)?),
                        None => None,
                    };
                    if let Some(acc) = accumulators.next() {
                        acc.update(value)?;
                    }
                }
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut row = Row::new(None);
            let mut first = group.first.into_iter();
            let mut accumulators = group.accumulators.into_iter();
            for (index, item) in items.iter().enumerate() {
                let value = if item.is_aggregate() {
                    accumulators.next().map_or(Value::Null, Accumulator::finish)
                } else {
                    first.next().unwrap_or(Value::Null)
                };
                row.push(item.column_name(index), value);
            }
            row
        })
        .collect())
}
