//! Builds parameterized SELECT, COUNT, INSERT and UPDATE from a model descriptor.
//! Identifiers come from the descriptor only; values are always parameters.

use crate::config::{FieldInfo, ModelMeta, RelationInfo};
use crate::error::ModelError;
use crate::fields::CleanData;
use crate::lookup::{parse_filters, Lookup, LookupOp};
use crate::model::Row;
use serde_json::Value;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// `$n::type` for a value bound to `field`.
    fn typed(&mut self, v: Value, field: &FieldInfo) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, field.cast_type())
    }

    /// `$n` for a text pattern.
    fn text(&mut self, s: String) -> String {
        let n = self.push_param(Value::String(s));
        format!("${}", n)
    }
}

/// SELECT list: numeric as float8 and custom enums (schema.typename) as text so rows decode to JSON.
fn select_column_list(meta: &ModelMeta) -> String {
    meta.fields
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            match f.pg_type.as_deref() {
                Some("numeric") => format!("{}::float8 AS {}", q, q),
                Some(t) if t.contains('.') => format!("{}::text AS {}", q, q),
                _ => q,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One comparison of `lhs` (an already quoted column expression) against `rhs`.
fn condition(q: &mut QueryBuf, lhs: &str, field: &FieldInfo, op: LookupOp, rhs: &Value) -> String {
    match op {
        LookupOp::Exact if rhs.is_null() => format!("{} IS NULL", lhs),
        LookupOp::Exact => format!("{} = {}", lhs, q.typed(rhs.clone(), field)),
        LookupOp::IExact => format!("UPPER({}::text) = UPPER({}::text)", lhs, q.text(text_of(rhs))),
        LookupOp::Contains | LookupOp::IContains => like(q, lhs, op, format!("%{}%", escape_like(&text_of(rhs)))),
        LookupOp::StartsWith | LookupOp::IStartsWith => like(q, lhs, op, format!("{}%", escape_like(&text_of(rhs)))),
        LookupOp::EndsWith | LookupOp::IEndsWith => like(q, lhs, op, format!("%{}", escape_like(&text_of(rhs)))),
        LookupOp::Gt => format!("{} > {}", lhs, q.typed(rhs.clone(), field)),
        LookupOp::Gte => format!("{} >= {}", lhs, q.typed(rhs.clone(), field)),
        LookupOp::Lt => format!("{} < {}", lhs, q.typed(rhs.clone(), field)),
        LookupOp::Lte => format!("{} <= {}", lhs, q.typed(rhs.clone(), field)),
        LookupOp::In => {
            let items = rhs.as_array().map(Vec::as_slice).unwrap_or(&[]);
            if items.is_empty() {
                return "FALSE".into();
            }
            let phs: Vec<String> = items.iter().map(|v| q.typed(v.clone(), field)).collect();
            format!("{} IN ({})", lhs, phs.join(", "))
        }
        LookupOp::Range => match rhs.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                let low = q.typed(low.clone(), field);
                let high = q.typed(high.clone(), field);
                format!("{} BETWEEN {} AND {}", lhs, low, high)
            }
            _ => "FALSE".into(),
        },
        LookupOp::IsNull => {
            if rhs.as_bool().unwrap_or(false) {
                format!("{} IS NULL", lhs)
            } else {
                format!("{} IS NOT NULL", lhs)
            }
        }
    }
}

fn like(q: &mut QueryBuf, lhs: &str, op: LookupOp, pattern: String) -> String {
    let kw = if op.is_case_insensitive() { "ILIKE" } else { "LIKE" };
    format!("{}::text {} {}", lhs, kw, q.text(pattern))
}

fn lookup_condition(q: &mut QueryBuf, lookup: &Lookup<'_>, rhs: &Value) -> String {
    match lookup.related {
        None => condition(q, &quoted(&lookup.field.name), lookup.field, lookup.op, rhs),
        Some((rel, target)) => related_condition(q, lookup.field, rel, target, lookup.op, rhs),
    }
}

/// `fk IN (SELECT to FROM related WHERE <cond on related column>)`. When the condition holds
/// for null, rows with a null foreign key match too, as with an outer join.
fn related_condition(
    q: &mut QueryBuf,
    fk: &FieldInfo,
    rel: &RelationInfo,
    target: &FieldInfo,
    op: LookupOp,
    rhs: &Value,
) -> String {
    let inner = condition(q, &quoted(&target.name), target, op, rhs);
    let subquery = format!(
        "{} IN (SELECT {} FROM {} WHERE {})",
        quoted(&fk.name),
        quoted(&rel.to_field),
        qualified_table(&rel.schema_name, &rel.table_name),
        inner
    );
    if op.matches(&Value::Null, rhs) {
        format!("({} IS NULL OR {})", quoted(&fk.name), subquery)
    } else {
        subquery
    }
}

fn where_clause(q: &mut QueryBuf, meta: &ModelMeta, filters: &CleanData) -> Result<String, ModelError> {
    let lookups = parse_filters(meta, filters)?;
    let parts: Vec<String> = lookups
        .iter()
        .map(|(lookup, rhs)| lookup_condition(q, lookup, rhs))
        .collect();
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

/// SELECT matching rows ORDER BY pk, optional LIMIT.
pub fn select_where(meta: &ModelMeta, filters: &CleanData, limit: Option<u32>) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(&meta.schema_name, &meta.table_name);
    let where_clause = where_clause(&mut q, meta, filters)?;
    let order_clause = if meta.pk_column.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", quoted(&meta.pk_column))
    };
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(meta),
        table,
        where_clause,
        order_clause,
        limit_clause
    );
    Ok(q)
}

pub fn count_where(meta: &ModelMeta, filters: &CleanData) -> Result<QueryBuf, ModelError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(&meta.schema_name, &meta.table_name);
    let where_clause = where_clause(&mut q, meta, filters)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause);
    Ok(q)
}

/// INSERT all declared fields from `row`. Columns with a default (including serial keys) are
/// omitted when the row leaves them null, so the database fills them.
pub fn insert(meta: &ModelMeta, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&meta.schema_name, &meta.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in &meta.fields {
        let val = row.get(&f.name).cloned().unwrap_or(Value::Null);
        if val.is_null() && f.has_default() {
            continue;
        }
        placeholders.push(q.typed(val, f));
        cols.push(quoted(&f.name));
    }
    let returning = select_column_list(meta);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE every non-key declared field by primary key.
pub fn update_by_pk(meta: &ModelMeta, pk: &Value, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&meta.schema_name, &meta.table_name);
    let returning = select_column_list(meta);
    let mut sets = Vec::new();
    for f in meta.fields.iter().filter(|f| !f.primary_key) {
        let val = row.get(&f.name).cloned().unwrap_or(Value::Null);
        let rhs = q.typed(val, f);
        sets.push(format!("{} = {}", quoted(&f.name), rhs));
    }
    let pk_expr = match meta.pk_field() {
        Some(pk_field) => q.typed(pk.clone(), pk_field),
        None => format!("${}", q.push_param(pk.clone())),
    };
    q.sql = if sets.is_empty() {
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            returning,
            table,
            quoted(&meta.pk_column),
            pk_expr
        )
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            quoted(&meta.pk_column),
            pk_expr,
            returning
        )
    };
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Kwargs;
    use serde_json::json;

    fn metas() -> (ModelMeta, ModelMeta) {
        let author = ModelMeta::new("Author")
            .table("authors")
            .schema("library")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("name", "varchar(200)").not_null());
        let book = ModelMeta::new("Book")
            .table("books")
            .schema("library")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("title", "text").not_null())
            .field(FieldInfo::new("price", "numeric(8, 2)"))
            .field(FieldInfo::new("published", "date"))
            .field(FieldInfo::new("author", "bigint").references(&author));
        (author, book)
    }

    fn clean(meta: &ModelMeta, v: Value) -> CleanData {
        let kw: Kwargs = match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        CleanData::from_kwargs(meta.field_names(), &kw)
    }

    #[test]
    fn select_with_plain_and_op_lookups() {
        let (_, book) = metas();
        let q = select_where(&book, &clean(&book, json!({ "title__icontains": "dune", "price__lt": 10 })), Some(2))
            .expect("select");
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"title\", \"price\"::float8 AS \"price\", \"published\", \"author\" \
             FROM \"library\".\"books\" WHERE \"price\" < $1::numeric AND \"title\"::text ILIKE $2 \
             ORDER BY \"id\" LIMIT 2"
        );
        assert_eq!(q.params, vec![json!(10), json!("%dune%")]);
    }

    #[test]
    fn related_lookup_becomes_subquery() {
        let (_, book) = metas();
        let q = count_where(&book, &clean(&book, json!({ "author__name__startswith": "Frank_" }))).expect("count");
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"library\".\"books\" WHERE \"author\" IN \
             (SELECT \"id\" FROM \"library\".\"authors\" WHERE \"name\"::text LIKE $1)"
        );
        assert_eq!(q.params, vec![json!("Frank\\_%")]);
    }

    #[test]
    fn related_null_lookups_include_null_foreign_keys() {
        let (_, book) = metas();
        let q = count_where(&book, &clean(&book, json!({ "author__name__isnull": true }))).expect("count");
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"library\".\"books\" WHERE (\"author\" IS NULL OR \"author\" IN \
             (SELECT \"id\" FROM \"library\".\"authors\" WHERE \"name\" IS NULL))"
        );

        let q = count_where(&book, &clean(&book, json!({ "author__name": null }))).expect("count");
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"library\".\"books\" WHERE (\"author\" IS NULL OR \"author\" IN \
             (SELECT \"id\" FROM \"library\".\"authors\" WHERE \"name\" IS NULL))"
        );
        assert!(q.params.is_empty());

        let q = count_where(&book, &clean(&book, json!({ "author__name__isnull": false }))).expect("count");
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"library\".\"books\" WHERE \"author\" IN \
             (SELECT \"id\" FROM \"library\".\"authors\" WHERE \"name\" IS NOT NULL)"
        );
    }

    #[test]
    fn null_in_range_and_isnull() {
        let (_, book) = metas();
        let q = select_where(
            &book,
            &clean(
                &book,
                json!({
                    "author": null,
                    "id__in": [1, 2],
                    "published__range": ["1965-01-01", "1969-12-31"],
                    "price__isnull": false,
                    "title__in": []
                }),
            ),
            None,
        )
        .expect("select");
        assert!(q.sql.contains("WHERE \"author\" IS NULL AND \"id\" IN ($1::bigint, $2::bigint) AND \"price\" IS NOT NULL AND \"published\" BETWEEN $3::date AND $4::date AND FALSE ORDER BY"));
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn insert_omits_defaulted_nulls() {
        let (_, book) = metas();
        let row = match json!({ "id": null, "title": "Dune", "price": null, "published": "1965-08-01", "author": 1 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = insert(&book, &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"library\".\"books\" (\"title\", \"price\", \"published\", \"author\") \
             VALUES ($1::text, $2::numeric, $3::date, $4::bigint) \
             RETURNING \"id\", \"title\", \"price\"::float8 AS \"price\", \"published\", \"author\""
        );
        assert_eq!(q.params, vec![json!("Dune"), Value::Null, json!("1965-08-01"), json!(1)]);
    }

    #[test]
    fn update_sets_non_key_fields() {
        let (author, _) = metas();
        let row = match json!({ "id": 7, "name": "Frank Herbert" }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = update_by_pk(&author, &json!(7), &row);
        assert_eq!(
            q.sql,
            "UPDATE \"library\".\"authors\" SET \"name\" = $1::varchar(200) WHERE \"id\" = $2::bigint RETURNING \"id\", \"name\""
        );
        assert_eq!(q.params, vec![json!("Frank Herbert"), json!(7)]);
    }

    #[test]
    fn unresolvable_filter_is_field_error() {
        let (_, book) = metas();
        let bad = clean(&book, json!({ "title__author": "x" }));
        assert!(matches!(select_where(&book, &bad, None), Err(ModelError::Field(_))));
    }

    #[test]
    fn quoting_escapes_identifiers() {
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
