//! DDL for model descriptors: schema, table, column constraints and foreign keys.
//! Tables referenced by others must be created first; `apply_models` keeps the given order.

use crate::config::{ColumnDefaultConfig, FieldInfo, ModelMeta};
use crate::error::ModelError;
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;

fn default_sql(default: &ColumnDefaultConfig) -> String {
    match default {
        ColumnDefaultConfig::Expression { expression } => expression.clone(),
        ColumnDefaultConfig::Literal(lit) => {
            let t = lit.trim();
            let is_keyword = matches!(t.to_lowercase().as_str(), "true" | "false" | "null");
            let is_quoted = t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'');
            if is_keyword || is_quoted || t.parse::<f64>().is_ok() {
                t.to_string()
            } else {
                format!("'{}'", t.replace('\'', "''"))
            }
        }
    }
}

fn column_def(f: &FieldInfo) -> String {
    let mut def = format!("{} {}", quoted(&f.name), f.sql_type);
    if f.primary_key {
        def.push_str(" PRIMARY KEY");
    } else {
        if !f.nullable {
            def.push_str(" NOT NULL");
        }
        if f.unique {
            def.push_str(" UNIQUE");
        }
    }
    if let Some(d) = &f.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default_sql(d));
    }
    if let Some(rel) = &f.relation {
        def.push_str(&format!(
            " REFERENCES {} ({})",
            qualified_table(&rel.schema_name, &rel.table_name),
            quoted(&rel.to_field)
        ));
    }
    def
}

/// `CREATE SCHEMA IF NOT EXISTS` followed by `CREATE TABLE IF NOT EXISTS`.
pub fn create_table_sql(meta: &ModelMeta) -> Vec<String> {
    let mut col_defs: Vec<String> = meta.fields.iter().map(column_def).collect();
    for set in &meta.unique {
        let cols: Vec<String> = set.iter().map(|c| quoted(c)).collect();
        col_defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&meta.schema_name)),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            qualified_table(&meta.schema_name, &meta.table_name),
            col_defs.join(",\n  ")
        ),
    ]
}

pub async fn ensure_table(pool: &PgPool, meta: &ModelMeta) -> Result<(), ModelError> {
    for sql in create_table_sql(meta) {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(model = %meta.name, table = %meta.table_name, "table ready");
    Ok(())
}

/// Create every table in order.
pub async fn apply_models(pool: &PgPool, metas: &[&ModelMeta]) -> Result<(), ModelError> {
    for meta in metas {
        ensure_table(pool, meta).await?;
    }
    Ok(())
}
