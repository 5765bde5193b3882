//! Demo: create, update, get and filter authors and books through `ModelService`.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! With `DATABASE_URL` set the tables are created in PostgreSQL; otherwise the memory store is used.

use model_ops::{
    apply_models, connect, Extra, FieldInfo, Kwargs, Manager, MemoryStore, Model, ModelMeta, ModelOperations,
    ModelService, PgManager, Settings, ValidationRule,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

static SCHEMA: OnceLock<String> = OnceLock::new();

fn schema() -> &'static str {
    SCHEMA.get().map(String::as_str).unwrap_or("public")
}

#[derive(Debug, Serialize, Deserialize)]
struct Author {
    id: Option<i64>,
    name: String,
    email: Option<String>,
}

impl Model for Author {
    fn meta() -> &'static ModelMeta {
        static META: OnceLock<ModelMeta> = OnceLock::new();
        META.get_or_init(|| {
            ModelMeta::new("Author")
                .table("authors")
                .schema(schema())
                .field(FieldInfo::new("id", "bigserial").primary_key())
                .field(FieldInfo::new("name", "varchar(200)").not_null().unique())
                .field(FieldInfo::new("email", "text"))
                .validate("email", ValidationRule { format: Some("email".into()), ..Default::default() })
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Book {
    id: Option<i64>,
    title: String,
    author: i64,
    published: Option<String>,
}

impl Model for Book {
    fn meta() -> &'static ModelMeta {
        static META: OnceLock<ModelMeta> = OnceLock::new();
        META.get_or_init(|| {
            ModelMeta::new("Book")
                .table("books")
                .schema(schema())
                .field(FieldInfo::new("id", "bigserial").primary_key())
                .field(FieldInfo::new("title", "text").not_null())
                .field(FieldInfo::new("author", "bigint").not_null().references(Author::meta()))
                .field(FieldInfo::new("published", "date"))
                .unique_together(&["title", "author"])
        })
    }
}

fn kw(v: Value) -> Kwargs {
    match v {
        Value::Object(m) => m,
        _ => Kwargs::new(),
    }
}

async fn run(authors: ModelService<Author>, books: ModelService<Book>) -> Result<(), Box<dyn std::error::Error>> {
    // Reruns hit the unique name; fail silently and look the author up instead.
    let herbert = kw(json!({ "name": "Frank Herbert", "source": "demo" }));
    if authors.create_objects(&herbert, &Extra::silent()).await?.is_none() {
        tracing::info!("author already present");
    }
    let mut author = authors
        .get_object(&herbert, &Extra::default())
        .await?
        .ok_or("author lookup returned nothing")?;

    authors
        .update_objects(&mut author, &kw(json!({ "email": "frank@dune.example" })), &Extra::default())
        .await?;
    tracing::info!(?author, "updated author");

    for (title, published) in [("Dune", "1965-08-01"), ("Dune Messiah", "1969-10-15")] {
        let created = books
            .create_objects(
                &kw(json!({ "title": title, "author": author.id, "published": published })),
                &Extra::silent(),
            )
            .await?;
        tracing::info!(title, created = created.is_some(), "book");
    }

    let sixties = books.filter_objects(&kw(json!({
        "author__name__istartswith": "frank",
        "published__range": ["1960-01-01", "1969-12-31"]
    })))?;
    let count = sixties.count().await?;
    tracing::info!(count, "books by Frank Herbert in the sixties");
    for book in sixties.fetch().await? {
        tracing::info!(title = %book.title, published = ?book.published, "match");
    }

    match authors
        .get_object(&kw(json!({ "name": "Nobody" })), &Extra::default())
        .await
    {
        Ok(_) => tracing::warn!("unexpected match"),
        Err(e) => tracing::info!(kind = ?e.kind(), error = %e, "expected failure"),
    }
    Ok(())
}

fn service<M: Model>(manager: impl Manager<M> + 'static) -> ModelService<M> {
    ModelService::new(manager)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("model_ops=info,example_consumer=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let _ = SCHEMA.set(settings.schema.clone());

    match settings.database_url.as_deref() {
        Some(url) => {
            let pool = connect(url, settings.max_connections).await?;
            apply_models(&pool, &[Author::meta(), Book::meta()]).await?;
            run(
                service(PgManager::<Author>::new(pool.clone())),
                service(PgManager::<Book>::new(pool)),
            )
            .await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using the memory store");
            let store = MemoryStore::new();
            run(service(store.manager::<Author>()), service(store.manager::<Book>())).await
        }
    }
}
