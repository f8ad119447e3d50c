//! Expression and predicate evaluation.

use std::cmp::Ordering;

use crate::errors::DocGraphError;
use crate::record::Record;
use crate::value::Value;

use super::ast::{CompareOp, Condition, Expr};
use super::result::Row;

/// Anything fields can be resolved against: a bound record tuple or an output row.
pub(crate) trait FieldSource {
    fn resolve(&self, path: &[String]) -> Value;
}

#[derive(Clone, Copy)]
pub(crate) struct Binding<'a> {
    pub name: &'a str,
    pub record: &'a Record,
}

/// The left record of a tuple and, under a join, the matching right record.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub left: Binding<'a>,
    pub right: Option<Binding<'a>>,
}

impl<'a> Scope<'a> {
    pub fn single(name: &'a str, record: &'a Record) -> Self {
        Self {
            left: Binding { name, record },
            right: None,
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding<'a>> {
        std::iter::once(&self.left).chain(self.right.as_ref())
    }
}

impl FieldSource for Scope<'_> {
    fn resolve(&self, path: &[String]) -> Value {
        let Some((head, rest)) = path.split_first() else {
            return Value::Null;
        };
        if !rest.is_empty() {
            let qualified = self
                .bindings()
                .find(|b| b.name == head.as_str() || b.record.type_name == *head);
            if let Some(binding) = qualified {
                return record_field(binding.record, rest);
            }
        }
        for binding in self.bindings() {
            let value = record_field(binding.record, path);
            if !value.is_null() {
                return value;
            }
        }
        Value::Null
    }
}

impl FieldSource for Row {
    fn resolve(&self, path: &[String]) -> Value {
        let Some((head, rest)) = path.split_first() else {
            return Value::Null;
        };
        if let Some(value) = self.get(head) {
            return value
                .path(rest.iter().map(String::as_str))
                .cloned()
                .unwrap_or(Value::Null);
        }
        path.last()
            .and_then(|last| self.get(last))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Field of a record, including the `@rid`, `@type`, `@version`, `@out` and `@in` attributes.
pub(crate) fn record_field(record: &Record, path: &[String]) -> Value {
    let Some((head, rest)) = path.split_first() else {
        return Value::Null;
    };
    let root = match head.as_str() {
        "@rid" => Value::Ref(record.id),
        "@type" => Value::String(record.type_name.clone()),
        "@version" => Value::Int(record.version as i64),
        "@out" => record.endpoints.map_or(Value::Null, |ends| Value::Ref(ends.from)),
        "@in" => record.endpoints.map_or(Value::Null, |ends| Value::Ref(ends.to)),
        name => match record.properties.get(name) {
            Some(value) => value.clone(),
            None => return Value::Null,
        },
    };
    if rest.is_empty() {
        root
    } else {
        root.path(rest.iter().map(String::as_str))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

pub(crate) fn eval_expr<S: FieldSource + ?Sized>(
    expr: &Expr,
    source: &S,
    params: &[Value],
) -> Result<Value, DocGraphError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Param(index) => params.get(*index).cloned().ok_or_else(|| {
            DocGraphError::invalid_argument(format!("missing value for parameter {}", index + 1))
        }),
        Expr::Field(path) => Ok(source.resolve(path)),
        Expr::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval_expr(value, source, params)?);
            }
            Ok(Value::Map(map))
        }
        Expr::List(items) => items
            .iter()
            .map(|item| eval_expr(item, source, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Concat(left, right) => concat(
            eval_expr(left, source, params)?,
            eval_expr(right, source, params)?,
        ),
    }
}

/// `||`: merges maps (right wins), appends lists, joins strings. Null is the identity.
pub(crate) fn concat(left: Value, right: Value) -> Result<Value, DocGraphError> {
    match (left, right) {
        (Value::Null, other) | (other, Value::Null) => Ok(other),
        (Value::Map(mut base), Value::Map(extra)) => {
            base.extend(extra);
            Ok(Value::Map(base))
        }
        (Value::List(mut base), Value::List(extra)) => {
            base.extend(extra);
            Ok(Value::List(base))
        }
        (Value::List(mut base), item) => {
            base.push(item);
            Ok(Value::List(base))
        }
        (Value::String(mut base), other) => {
            base.push_str(&other.to_string());
            Ok(Value::String(base))
        }
        (left, right) => Err(DocGraphError::invalid_argument(format!(
            "cannot apply || to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

pub(crate) fn eval_condition<S: FieldSource + ?Sized>(
    condition: &Condition,
    source: &S,
    params: &[Value],
) -> Result<bool, DocGraphError> {
    match condition {
        Condition::Compare { left, op, right } => {
            let left = eval_expr(left, source, params)?;
            let right = eval_expr(right, source, params)?;
            Ok(compare(&left, *op, &right))
        }
        Condition::IsNull { expr, negated } => {
            let value = eval_expr(expr, source, params)?;
            Ok(value.is_null() != *negated)
        }
        Condition::And(a, b) => {
            Ok(eval_condition(a, source, params)? && eval_condition(b, source, params)?)
        }
        Condition::Or(a, b) => {
            Ok(eval_condition(a, source, params)? || eval_condition(b, source, params)?)
        }
        Condition::Not(inner) => Ok(!eval_condition(inner, source, params)?),
    }
}

/// Comparisons involving null are false; mismatched kinds are only ever unequal.
pub(crate) fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match op {
        CompareOp::Eq => left.loosely_equals(right),
        CompareOp::Ne => !left.loosely_equals(right),
        CompareOp::Lt => left.compare(right) == Some(Ordering::Less),
        CompareOp::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => left.compare(right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            left.compare(right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TypeKind;
    use crate::value::{Properties, RecordId, properties};
    use serde_json::json;

    fn record(id: u64, ty: &str, props: serde_json::Value) -> Record {
        Record::new(
            RecordId::new(id),
            ty,
            TypeKind::Document,
            properties(props).expect("props"),
        )
    }

    fn path(text: &str) -> Vec<String> {
        text.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_scope_resolves_qualified_unqualified_and_nested_fields() {
        let customer = record(1, "Customer", json!({"id": "CUST_001", "name": "John"}));
        let order = record(
            2,
            "Order",
            json!({"id": "ORDER_1", "customerId": "CUST_001", "meta": {"channel": "web"}}),
        );
        let scope = Scope {
            left: Binding {
                name: "c",
                record: &customer,
            },
            right: Some(Binding {
                name: "o",
                record: &order,
            }),
        };
        assert_eq!(scope.resolve(&path("o.id")), Value::from("ORDER_1"));
        assert_eq!(scope.resolve(&path("id")), Value::from("CUST_001"));
        assert_eq!(scope.resolve(&path("customerId")), Value::from("CUST_001"));
        assert_eq!(scope.resolve(&path("o.meta.channel")), Value::from("web"));
        assert_eq!(scope.resolve(&path("Order.id")), Value::from("ORDER_1"));
        assert_eq!(scope.resolve(&path("missing")), Value::Null);
        assert_eq!(scope.resolve(&path("@rid")), Value::Ref(RecordId::new(1)));
    }

    #[test]
    fn test_comparisons_treat_null_as_unknown() {
        assert!(!compare(&Value::Null, CompareOp::Eq, &Value::Null));
        assert!(!compare(&Value::Null, CompareOp::Ne, &Value::Int(1)));
        assert!(compare(&Value::from("a"), CompareOp::Ne, &Value::Int(1)));
        assert!(!compare(&Value::from("a"), CompareOp::Lt, &Value::Int(1)));
        assert!(compare(&Value::Float(60.0), CompareOp::Gt, &Value::Int(50)));
    }

    #[test]
    fn test_concat_merges_maps_and_rejects_mismatches() {
        let mut base = Properties::new();
        base.insert("theme".into(), "light".into());
        let mut extra = Properties::new();
        extra.insert("theme".into(), "dark".into());
        extra.insert("language".into(), "en".into());
        let merged = concat(Value::Map(base), Value::Map(extra)).expect("merge");
        assert_eq!(merged.path(["theme"]), Some(&Value::from("dark")));
        assert_eq!(merged.path(["language"]), Some(&Value::from("en")));

        assert_eq!(
            concat(Value::Null, Value::Int(3)).expect("identity"),
            Value::Int(3)
        );
        assert!(concat(Value::Int(1), Value::Bool(true)).is_err());
    }

    #[test]
    fn test_missing_parameter_is_invalid_argument() {
        let doc = record(1, "User", json!({}));
        let scope = Scope::single("User", &doc);
        let err = eval_expr(&Expr::Param(1), &scope, &[Value::Int(1)]).expect_err("missing");
        assert!(matches!(err, DocGraphError::InvalidArgument(_)));
    }
}
