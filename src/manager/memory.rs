//! In-process store: every table of every model behind one lock. Enforces the same
//! constraints the SQL schema would (NOT NULL, UNIQUE, FOREIGN KEY) so models behave the same
//! against either manager.

use super::Manager;
use crate::config::{ColumnDefaultConfig, FieldInfo, ModelMeta, PkType};
use crate::error::ModelError;
use crate::fields::CleanData;
use crate::lookup::{compare, parse_filters, values_equal, Lookup};
use crate::model::{Model, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    /// Last integer key handed out.
    last_id: i64,
}

/// Shared handle; clones see the same tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager<M: Model>(&self) -> MemoryManager<M> {
        MemoryManager {
            store: self.clone(),
            _model: PhantomData,
        }
    }

    /// Number of stored rows for a model.
    pub fn row_count(&self, meta: &ModelMeta) -> usize {
        self.tables
            .read()
            .map(|t| {
                t.get(&table_key(&meta.schema_name, &meta.table_name))
                    .map(|table| table.rows.len())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

pub struct MemoryManager<M> {
    store: MemoryStore,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for MemoryManager<M> {
    fn clone(&self) -> Self {
        MemoryManager {
            store: self.store.clone(),
            _model: PhantomData,
        }
    }
}

fn poisoned<T>(_: T) -> ModelError {
    ModelError::Store("memory store lock poisoned".into())
}

/// Value a column default produces when the row leaves the column empty.
fn default_value(default: &ColumnDefaultConfig) -> Value {
    match default {
        ColumnDefaultConfig::Literal(lit) => literal_value(lit),
        ColumnDefaultConfig::Expression { expression } => match expression.trim().to_lowercase().as_str() {
            "now()" | "current_timestamp" => Value::String(chrono::Utc::now().to_rfc3339()),
            "current_date" => Value::String(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            "gen_random_uuid()" | "uuid_generate_v4()" => Value::String(uuid::Uuid::new_v4().to_string()),
            other => literal_value(other),
        },
    }
}

fn literal_value(lit: &str) -> Value {
    let trimmed = lit.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
        .unwrap_or_else(|| trimmed.to_string());
    Value::String(unquoted)
}

fn is_null(row: &Row, col: &str) -> bool {
    row.get(col).map(Value::is_null).unwrap_or(true)
}

fn pk_order(meta: &ModelMeta) -> impl Fn(&Row, &Row) -> Ordering + '_ {
    move |a: &Row, b: &Row| {
        let (x, y) = (a.get(&meta.pk_column), b.get(&meta.pk_column));
        match (x, y) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    }
}

impl<M: Model> MemoryManager<M> {
    /// Declared fields only, with defaults applied to empty columns on insert.
    fn prepare_row(meta: &ModelMeta, obj: &M, inserting: bool) -> Result<Row, ModelError> {
        let mut source = obj.to_row()?;
        let mut row = Row::new();
        for f in &meta.fields {
            let v = source.remove(&f.name).unwrap_or(Value::Null);
            let v = match (&f.default, inserting && v.is_null() && !f.primary_key) {
                (Some(d), true) => default_value(d),
                _ => v,
            };
            row.insert(f.name.clone(), v);
        }
        Ok(row)
    }

    fn check_constraints(
        meta: &ModelMeta,
        tables: &HashMap<String, Table>,
        row: &Row,
        replacing: Option<usize>,
    ) -> Result<(), ModelError> {
        let key = table_key(&meta.schema_name, &meta.table_name);
        let others: Vec<&Row> = tables
            .get(&key)
            .map(|t| {
                t.rows
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != replacing)
                    .map(|(_, r)| r)
                    .collect()
            })
            .unwrap_or_default();

        for f in &meta.fields {
            if !f.nullable && is_null(row, &f.name) {
                return Err(ModelError::Integrity(format!(
                    "NOT NULL constraint failed: {}.{}",
                    meta.table_name, f.name
                )));
            }
        }

        let mut unique_sets: Vec<Vec<&str>> = meta
            .fields
            .iter()
            .filter(|f| f.unique || f.primary_key)
            .map(|f| vec![f.name.as_str()])
            .collect();
        unique_sets.extend(meta.unique.iter().map(|set| set.iter().map(String::as_str).collect()));
        for set in unique_sets {
            if set.iter().any(|c| is_null(row, c)) {
                continue;
            }
            let clash = others.iter().any(|other| {
                set.iter().all(|c| match (other.get(*c), row.get(*c)) {
                    (Some(a), Some(b)) => values_equal(a, b),
                    _ => false,
                })
            });
            if clash {
                let cols: Vec<String> = set.iter().map(|c| format!("{}.{}", meta.table_name, c)).collect();
                return Err(ModelError::Integrity(format!(
                    "UNIQUE constraint failed: {}",
                    cols.join(", ")
                )));
            }
        }

        for f in &meta.fields {
            let (Some(rel), Some(v)) = (&f.relation, row.get(&f.name)) else { continue };
            if v.is_null() {
                continue;
            }
            let exists = tables
                .get(&table_key(&rel.schema_name, &rel.table_name))
                .map(|t| {
                    t.rows
                        .iter()
                        .any(|r| r.get(&rel.to_field).map(|x| values_equal(x, v)).unwrap_or(false))
                })
                .unwrap_or(false);
            if !exists {
                return Err(ModelError::Integrity(format!(
                    "FOREIGN KEY constraint failed: {}.{} -> {}.{}",
                    meta.table_name, f.name, rel.table_name, rel.to_field
                )));
            }
        }
        Ok(())
    }

    fn row_matches(tables: &HashMap<String, Table>, row: &Row, lookups: &[(Lookup<'_>, &Value)]) -> bool {
        lookups.iter().all(|(lookup, rhs)| {
            let own = row.get(&lookup.field.name).unwrap_or(&Value::Null);
            match lookup.related {
                None => lookup.op.matches(own, rhs),
                Some((rel, target)) => {
                    let related: Vec<&Row> = if own.is_null() {
                        Vec::new()
                    } else {
                        tables
                            .get(&table_key(&rel.schema_name, &rel.table_name))
                            .map(|t| {
                                t.rows
                                    .iter()
                                    .filter(|r| r.get(&rel.to_field).map(|x| values_equal(x, own)).unwrap_or(false))
                                    .collect()
                            })
                            .unwrap_or_default()
                    };
                    if related.is_empty() {
                        return lookup.op.matches(&Value::Null, rhs);
                    }
                    related
                        .iter()
                        .any(|r| lookup.op.matches(r.get(&target.name).unwrap_or(&Value::Null), rhs))
                }
            }
        })
    }

    fn generate_pk(pk: &FieldInfo, meta: &ModelMeta, table: Option<&Table>) -> Value {
        match meta.pk_type {
            PkType::BigInt | PkType::Int => {
                let last = table.map(|t| t.last_id).unwrap_or(0);
                Value::from(last + 1)
            }
            PkType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
            PkType::Text => pk.default.as_ref().map(default_value).unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl<M: Model> Manager<M> for MemoryManager<M> {
    async fn save(&self, obj: &mut M) -> Result<(), ModelError> {
        let meta = M::meta();
        let pk = meta
            .pk_field()
            .ok_or_else(|| ModelError::Field(format!("{} has no primary key", meta.name)))?;
        let key = table_key(&meta.schema_name, &meta.table_name);

        let stored = {
            let mut tables = self.store.tables.write().map_err(poisoned)?;
            let pk_value = obj.pk();
            let existing = pk_value.as_ref().and_then(|v| {
                tables.get(&key).and_then(|t| {
                    t.rows
                        .iter()
                        .position(|r| r.get(&pk.name).map(|x| values_equal(x, v)).unwrap_or(false))
                })
            });

            let mut row = Self::prepare_row(meta, obj, existing.is_none())?;
            if existing.is_none() && is_null(&row, &pk.name) && pk.has_default() {
                row.insert(pk.name.clone(), Self::generate_pk(pk, meta, tables.get(&key)));
            }
            Self::check_constraints(meta, &tables, &row, existing)?;

            let table = tables.entry(key).or_default();
            if let Some(n) = row.get(&pk.name).and_then(Value::as_i64) {
                table.last_id = table.last_id.max(n);
            }
            match existing {
                Some(i) => table.rows[i] = row.clone(),
                None => table.rows.push(row.clone()),
            }
            let op = if existing.is_some() { "update" } else { "insert" };
            let pk_value = row.get(&pk.name).cloned().unwrap_or(Value::Null);
            tracing::debug!(
                model = %meta.name,
                pk = %pk_value,
                op,
                "memory save"
            );
            row
        };
        *obj = M::from_row(stored)?;
        Ok(())
    }

    async fn fetch(&self, filters: &CleanData, limit: Option<u32>) -> Result<Vec<M>, ModelError> {
        let meta = M::meta();
        let lookups = parse_filters(meta, filters)?;
        let mut rows: Vec<Row> = {
            let tables = self.store.tables.read().map_err(poisoned)?;
            tables
                .get(&table_key(&meta.schema_name, &meta.table_name))
                .map(|t| {
                    t.rows
                        .iter()
                        .filter(|r| Self::row_matches(&tables, r, &lookups))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        rows.sort_by(pk_order(meta));
        if let Some(n) = limit {
            rows.truncate(n as usize);
        }
        tracing::debug!(model = %meta.name, filters = ?filters.as_map(), matched = rows.len(), "memory fetch");
        rows.into_iter().map(M::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_from_literals_and_expressions() {
        assert_eq!(literal_value("3"), json!(3));
        assert_eq!(literal_value("true"), json!(true));
        assert_eq!(literal_value("fiction"), json!("fiction"));
        assert_eq!(literal_value("'it''s'"), json!("it's"));
        let uuid = default_value(&ColumnDefaultConfig::Expression { expression: "gen_random_uuid()".into() });
        assert!(uuid.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false));
        let now = default_value(&ColumnDefaultConfig::Expression { expression: "NOW()".into() });
        assert!(now.as_str().map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()).unwrap_or(false));
    }
}
