//! PostgreSQL manager: runs the SQL builder's statements on a pool and maps rows to models.

use super::Manager;
use crate::error::ModelError;
use crate::fields::CleanData;
use crate::model::{Model, Row};
use crate::sql::{count_where, insert, select_where, update_by_pk, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::PgPool;
use std::marker::PhantomData;

/// Open a pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, ModelError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    tracing::info!(max_connections, "connected to database");
    Ok(pool)
}

pub struct PgManager<M> {
    pool: PgPool,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for PgManager<M> {
    fn clone(&self) -> Self {
        PgManager {
            pool: self.pool.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> PgManager<M> {
    pub fn new(pool: PgPool) -> Self {
        PgManager { pool, _model: PhantomData }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Row>, ModelError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_error)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_returning_one(&self, q: &QueryBuf) -> Result<Option<Row>, ModelError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await.map_err(map_db_error)?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

#[async_trait]
impl<M: Model> Manager<M> for PgManager<M> {
    async fn save(&self, obj: &mut M) -> Result<(), ModelError> {
        let meta = M::meta();
        if meta.pk_field().is_none() {
            return Err(ModelError::Field(format!("{} has no primary key", meta.name)));
        }
        let row = obj.to_row()?;

        let updated = match obj.pk() {
            Some(pk) => self.execute_returning_one(&update_by_pk(meta, &pk, &row)).await?,
            None => None,
        };
        let stored = match updated {
            Some(stored) => stored,
            None => self
                .execute_returning_one(&insert(meta, &row))
                .await?
                .ok_or_else(|| ModelError::Store(format!("insert into {} returned no row", meta.table_name)))?,
        };
        *obj = M::from_row(stored)?;
        Ok(())
    }

    async fn fetch(&self, filters: &CleanData, limit: Option<u32>) -> Result<Vec<M>, ModelError> {
        let q = select_where(M::meta(), filters, limit)?;
        self.query_many(&q).await?.into_iter().map(M::from_row).collect()
    }

    async fn count(&self, filters: &CleanData) -> Result<u64, ModelError> {
        let q = count_where(M::meta(), filters)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let n = query.fetch_one(&self.pool).await.map_err(map_db_error)?;
        Ok(n.max(0) as u64)
    }
}

/// Constraint violations become integrity errors and data exceptions (SQLSTATE class 22)
/// value errors. Anything else stays a database error.
pub(crate) fn map_db_error(e: sqlx::Error) -> ModelError {
    if let Some(db) = e.as_database_error() {
        match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => return ModelError::Integrity(db.message().to_string()),
            _ => {}
        }
        if db.code().map(|c| c.starts_with("22")).unwrap_or(false) {
            return ModelError::Value(db.message().to_string());
        }
    }
    ModelError::Db(e)
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
