//! Lookup keys: `field`, `field__op`, `field__related` and `field__related__op`.
//!
//! One level of relation traversal is supported. Managers evaluate parsed lookups; the SQL
//! builder renders them.

use crate::config::{FieldInfo, ModelMeta, RelationInfo};
use crate::error::ModelError;
use crate::fields::{CleanData, LOOKUP_SEP};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupOp {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Range,
    IsNull,
}

impl LookupOp {
    pub fn from_name(name: &str) -> Option<LookupOp> {
        Some(match name {
            "exact" => LookupOp::Exact,
            "iexact" => LookupOp::IExact,
            "contains" => LookupOp::Contains,
            "icontains" => LookupOp::IContains,
            "startswith" => LookupOp::StartsWith,
            "istartswith" => LookupOp::IStartsWith,
            "endswith" => LookupOp::EndsWith,
            "iendswith" => LookupOp::IEndsWith,
            "gt" => LookupOp::Gt,
            "gte" => LookupOp::Gte,
            "lt" => LookupOp::Lt,
            "lte" => LookupOp::Lte,
            "in" => LookupOp::In,
            "range" => LookupOp::Range,
            "isnull" => LookupOp::IsNull,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LookupOp::Exact => "exact",
            LookupOp::IExact => "iexact",
            LookupOp::Contains => "contains",
            LookupOp::IContains => "icontains",
            LookupOp::StartsWith => "startswith",
            LookupOp::IStartsWith => "istartswith",
            LookupOp::EndsWith => "endswith",
            LookupOp::IEndsWith => "iendswith",
            LookupOp::Gt => "gt",
            LookupOp::Gte => "gte",
            LookupOp::Lt => "lt",
            LookupOp::Lte => "lte",
            LookupOp::In => "in",
            LookupOp::Range => "range",
            LookupOp::IsNull => "isnull",
        }
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            LookupOp::IExact | LookupOp::IContains | LookupOp::IStartsWith | LookupOp::IEndsWith
        )
    }

    /// Reject right-hand sides the op cannot use.
    pub fn check_value(&self, key: &str, rhs: &Value) -> Result<(), ModelError> {
        match self {
            LookupOp::In if !rhs.is_array() => Err(ModelError::Value(format!("'{}' expects a list", key))),
            LookupOp::Range if rhs.as_array().map(Vec::len) != Some(2) => {
                Err(ModelError::Value(format!("'{}' expects a list of two bounds", key)))
            }
            LookupOp::IsNull if !rhs.is_boolean() => Err(ModelError::Value(format!("'{}' expects true or false", key))),
            _ => Ok(()),
        }
    }

    /// Evaluate `lhs <op> rhs` on stored JSON values.
    pub fn matches(&self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            LookupOp::Exact => {
                if rhs.is_null() {
                    lhs.is_null()
                } else {
                    values_equal(lhs, rhs)
                }
            }
            LookupOp::IExact => match (lhs.as_str(), rhs.as_str()) {
                (Some(l), Some(r)) => l.to_lowercase() == r.to_lowercase(),
                _ => values_equal(lhs, rhs),
            },
            LookupOp::Contains | LookupOp::IContains => self.text_match(lhs, rhs, |l, r| l.contains(r)),
            LookupOp::StartsWith | LookupOp::IStartsWith => self.text_match(lhs, rhs, |l, r| l.starts_with(r)),
            LookupOp::EndsWith | LookupOp::IEndsWith => self.text_match(lhs, rhs, |l, r| l.ends_with(r)),
            LookupOp::Gt => compare(lhs, rhs) == Some(Ordering::Greater),
            LookupOp::Gte => matches!(compare(lhs, rhs), Some(Ordering::Greater | Ordering::Equal)),
            LookupOp::Lt => compare(lhs, rhs) == Some(Ordering::Less),
            LookupOp::Lte => matches!(compare(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
            LookupOp::In => rhs
                .as_array()
                .map(|items| items.iter().any(|r| values_equal(lhs, r)))
                .unwrap_or(false),
            LookupOp::Range => match rhs.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    matches!(compare(lhs, low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(compare(lhs, high), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            },
            LookupOp::IsNull => rhs.as_bool().map(|b| lhs.is_null() == b).unwrap_or(false),
        }
    }

    fn text_match(&self, lhs: &Value, rhs: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
        let (Some(l), Some(r)) = (as_text(lhs), as_text(rhs)) else {
            return false;
        };
        if self.is_case_insensitive() {
            f(&l.to_lowercase(), &r.to_lowercase())
        } else {
            f(&l, &r)
        }
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality with numbers compared by value (1 == 1.0).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64()?.partial_cmp(&m.as_f64()?),
        (Value::String(s), Value::String(t)) => Some(s.cmp(t)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A parsed lookup key, borrowing from the model descriptor.
#[derive(Clone, Debug)]
pub struct Lookup<'m> {
    pub field: &'m FieldInfo,
    /// Relation and target field for `field__related[__op]`.
    pub related: Option<(&'m RelationInfo, &'m FieldInfo)>,
    pub op: LookupOp,
}

impl<'m> Lookup<'m> {
    /// The field whose value the op compares against.
    pub fn target(&self) -> &'m FieldInfo {
        match self.related {
            Some((_, f)) => f,
            None => self.field,
        }
    }
}

pub fn parse<'m>(meta: &'m ModelMeta, key: &str) -> Result<Lookup<'m>, ModelError> {
    let mut parts: Vec<&str> = key.split(LOOKUP_SEP).collect();
    let head = parts.remove(0);
    let field = meta.get_field(head).ok_or_else(|| {
        ModelError::Field(format!("Cannot resolve keyword '{}' into field of {}", head, meta.name))
    })?;

    let op = match parts.last().and_then(|p| LookupOp::from_name(p)) {
        Some(op) => {
            parts.pop();
            op
        }
        None => LookupOp::Exact,
    };

    let related = match parts.as_slice() {
        [] => None,
        [name] => {
            let relation = field.relation.as_ref().ok_or_else(|| {
                ModelError::Field(format!("Unsupported lookup '{}' for field '{}.{}'", name, meta.name, field.name))
            })?;
            let target = relation.field(name).ok_or_else(|| {
                ModelError::Field(format!(
                    "Cannot resolve keyword '{}' into field of {} (via {}.{})",
                    name, relation.model, meta.name, field.name
                ))
            })?;
            Some((relation, target))
        }
        _ => {
            return Err(ModelError::Field(format!(
                "Lookup '{}' spans more than one relation",
                key
            )))
        }
    };

    Ok(Lookup { field, related, op })
}

/// Parse and check every key/value of a clean mapping.
pub fn parse_filters<'m, 'd>(
    meta: &'m ModelMeta,
    filters: &'d CleanData,
) -> Result<Vec<(Lookup<'m>, &'d Value)>, ModelError> {
    let mut out = Vec::with_capacity(filters.len());
    for (key, value) in filters {
        let lookup = parse(meta, key)?;
        lookup.op.check_value(key, value)?;
        out.push((lookup, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldInfo;
    use serde_json::json;

    fn metas() -> (ModelMeta, ModelMeta) {
        let author = ModelMeta::new("Author")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("name", "text"));
        let book = ModelMeta::new("Book")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("title", "text"))
            .field(FieldInfo::new("author", "bigint").references(&author));
        (author, book)
    }

    #[test]
    fn parses_plain_op_and_related_keys() {
        let (_, book) = metas();
        let l = parse(&book, "title").expect("plain");
        assert_eq!((l.field.name.as_str(), l.op), ("title", LookupOp::Exact));
        assert!(l.related.is_none());

        let l = parse(&book, "title__icontains").expect("op");
        assert_eq!(l.op, LookupOp::IContains);

        let l = parse(&book, "author__name").expect("related");
        assert_eq!(l.target().name, "name");
        assert_eq!(l.op, LookupOp::Exact);

        let l = parse(&book, "author__name__startswith").expect("related op");
        assert_eq!(l.related.map(|(r, _)| r.model.as_str()), Some("Author"));
        assert_eq!(l.op, LookupOp::StartsWith);

        let l = parse(&book, "author__in").expect("fk op");
        assert!(l.related.is_none());
        assert_eq!(l.op, LookupOp::In);
    }

    #[test]
    fn rejects_unresolvable_keys() {
        let (author, book) = metas();
        assert!(matches!(parse(&book, "publisher"), Err(ModelError::Field(_))));
        assert!(matches!(parse(&book, "title__name"), Err(ModelError::Field(_))));
        assert!(matches!(parse(&book, "author__missing"), Err(ModelError::Field(_))));
        assert!(matches!(parse(&book, "author__name__x__y"), Err(ModelError::Field(_))));
        assert!(matches!(parse(&author, "name__bogus"), Err(ModelError::Field(_))));
    }

    #[test]
    fn checks_rhs_shapes() {
        assert!(LookupOp::In.check_value("id__in", &json!(3)).is_err());
        assert!(LookupOp::Range.check_value("id__range", &json!([1])).is_err());
        assert!(LookupOp::IsNull.check_value("name__isnull", &json!("yes")).is_err());
        assert!(LookupOp::Range.check_value("id__range", &json!([1, 5])).is_ok());
    }

    #[test]
    fn evaluates_ops_on_json() {
        assert!(LookupOp::Exact.matches(&json!(1), &json!(1.0)));
        assert!(LookupOp::Exact.matches(&Value::Null, &Value::Null));
        assert!(!LookupOp::Exact.matches(&json!("a"), &Value::Null));
        assert!(LookupOp::IExact.matches(&json!("Dune"), &json!("dUNE")));
        assert!(LookupOp::Contains.matches(&json!("Children of Dune"), &json!("of")));
        assert!(!LookupOp::Contains.matches(&json!("Children of Dune"), &json!("OF")));
        assert!(LookupOp::IContains.matches(&json!("Children of Dune"), &json!("OF")));
        assert!(LookupOp::IStartsWith.matches(&json!("Dune"), &json!("du")));
        assert!(LookupOp::EndsWith.matches(&json!("Dune"), &json!("ne")));
        assert!(LookupOp::Gt.matches(&json!(5), &json!(3)));
        assert!(!LookupOp::Gt.matches(&json!("5"), &json!(3)));
        assert!(LookupOp::Lte.matches(&json!("1965-08-01"), &json!("1965-08-01")));
        assert!(LookupOp::In.matches(&json!(2), &json!([1, 2, 3])));
        assert!(!LookupOp::In.matches(&json!(4), &json!([])));
        assert!(LookupOp::Range.matches(&json!(1965), &json!([1960, 1970])));
        assert!(LookupOp::IsNull.matches(&Value::Null, &json!(true)));
        assert!(LookupOp::IsNull.matches(&json!("x"), &json!(false)));
    }

    #[test]
    fn parse_filters_keeps_values() {
        let (_, book) = metas();
        let kw = match json!({ "title__in": ["Dune"], "author__name": "Herbert" }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let clean = CleanData::from_kwargs(book.field_names(), &kw);
        let parsed = parse_filters(&book, &clean).expect("parse");
        assert_eq!(parsed.len(), 2);

        let bad = match json!({ "title__in": "Dune" }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let clean = CleanData::from_kwargs(book.field_names(), &bad);
        assert!(matches!(parse_filters(&book, &clean), Err(ModelError::Value(_))));
    }
}
