use crate::graph_index::Direction;
use crate::record::TypeKind;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Positional `?` placeholder, numbered from zero in source order.
    Param(usize),
    /// `name`, `alias.name` or a dotted path into nested maps.
    Field(Vec<String>),
    Map(Vec<(String, Expr)>),
    List(Vec<Expr>),
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn field(name: &str) -> Self {
        Expr::Field(vec![name.to_string()])
    }

    /// Column name used when no alias is given.
    pub fn default_name(&self, index: usize) -> String {
        match self {
            Expr::Field(path) => path.last().cloned().unwrap_or_default(),
            _ => format!("expr{index}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Splits a top-level AND chain into its conjuncts.
    pub fn into_conjuncts(self) -> Vec<Condition> {
        match self {
            Condition::And(left, right) => {
                let mut parts = left.into_conjuncts();
                parts.extend(right.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    pub fn conjoin(parts: Vec<Condition>) -> Option<Condition> {
        parts
            .into_iter()
            .reduce(|acc, next| Condition::And(Box::new(acc), Box::new(next)))
    }

    pub(crate) fn visit_exprs<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        match self {
            Condition::Compare { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Condition::IsNull { expr, .. } => visit(expr),
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.visit_exprs(visit);
                b.visit_exprs(visit);
            }
            Condition::Not(inner) => inner.visit_exprs(visit),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFn::Count),
            "sum" => Some(AggregateFn::Sum),
            "avg" => Some(AggregateFn::Avg),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionItem {
    Expr {
        expr: Expr,
        alias: Option<String>,
    },
    /// `arg` is `None` for `COUNT(*)`.
    Aggregate {
        func: AggregateFn,
        arg: Option<Expr>,
        alias: Option<String>,
    },
}

impl ProjectionItem {
    pub fn column_name(&self, index: usize) -> String {
        match self {
            ProjectionItem::Expr { expr, alias } => {
                alias.clone().unwrap_or_else(|| expr.default_name(index))
            }
            ProjectionItem::Aggregate { func, alias, .. } => {
                alias.clone().unwrap_or_else(|| func.name().to_string())
            }
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, ProjectionItem::Aggregate { .. })
    }
}

/// `out('E')`, `in('E')`, `both()`; no edge types means every type.
#[derive(Clone, Debug, PartialEq)]
pub struct Traversal {
    pub direction: Direction,
    pub edge_types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    All,
    Items(Vec<ProjectionItem>),
    Expand(Traversal),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub type_name: String,
    pub alias: Option<String>,
}

impl Source {
    /// Name fields may be qualified with: the alias, or the type name without one.
    pub fn binding_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.type_name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub source: Source,
    pub left: Expr,
    pub right: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub projection: Projection,
    pub from: Source,
    pub join: Option<Join>,
    pub filter: Option<Condition>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<Expr>,
}

impl SelectQuery {
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || matches!(&self.projection, Projection::Items(items) if items.iter().any(ProjectionItem::is_aggregate))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    CreateType {
        name: String,
        kind: TypeKind,
        if_not_exists: bool,
    },
    Update {
        type_name: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Condition>,
    },
    Delete {
        type_name: String,
        filter: Option<Condition>,
    },
}

/// A parsed statement together with the number of `?` placeholders it binds.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub param_count: usize,
}
