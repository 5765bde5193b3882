#![allow(dead_code)]

use async_trait::async_trait;
use model_ops::{CleanData, FieldInfo, Kwargs, Manager, Model, ModelError, ModelMeta, ValidationRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub born: Option<i32>,
}

impl Model for Author {
    fn meta() -> &'static ModelMeta {
        static META: OnceLock<ModelMeta> = OnceLock::new();
        META.get_or_init(|| {
            ModelMeta::new("Author")
                .table("authors")
                .schema("library")
                .field(FieldInfo::new("id", "bigserial").primary_key())
                .field(FieldInfo::new("name", "varchar(100)").not_null().unique())
                .field(FieldInfo::new("email", "text"))
                .field(FieldInfo::new("born", "integer"))
                .validate("name", ValidationRule { max_length: Some(100), ..Default::default() })
                .validate("email", ValidationRule { format: Some("email".into()), ..Default::default() })
                .validate("born", ValidationRule { minimum: Some(0.0), ..Default::default() })
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author: i64,
    pub pages: Option<i32>,
    pub genre: Option<String>,
}

impl Model for Book {
    fn meta() -> &'static ModelMeta {
        static META: OnceLock<ModelMeta> = OnceLock::new();
        META.get_or_init(|| {
            ModelMeta::new("Book")
                .table("books")
                .schema("library")
                .field(FieldInfo::new("id", "bigserial").primary_key())
                .field(FieldInfo::new("title", "text").not_null())
                .field(FieldInfo::new("author", "bigint").not_null().references(Author::meta()))
                .field(FieldInfo::new("pages", "integer"))
                .field(FieldInfo::new("genre", "text").not_null().default_literal("fiction"))
                .unique_together(&["title", "author"])
                .validate("pages", ValidationRule { minimum: Some(1.0), ..Default::default() })
        })
    }
}

/// Object literal to keyword mapping.
pub fn kw(v: Value) -> Kwargs {
    match v {
        Value::Object(m) => m,
        other => panic!("expected an object, got {}", other),
    }
}

/// Delegates to another manager and counts how often persistence is reached.
pub struct CountingManager<Inner> {
    inner: Inner,
    saves: AtomicUsize,
    fetches: AtomicUsize,
}

impl<Inner> CountingManager<Inner> {
    pub fn new(inner: Inner) -> Self {
        CountingManager {
            inner,
            saves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M, Inner> Manager<M> for CountingManager<Inner>
where
    M: Model,
    Inner: Manager<M>,
{
    async fn save(&self, obj: &mut M) -> Result<(), ModelError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(obj).await
    }

    async fn fetch(&self, filters: &CleanData, limit: Option<u32>) -> Result<Vec<M>, ModelError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(filters, limit).await
    }
}
