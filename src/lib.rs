//! model-ops: generic create/update/get/filter helpers over a model's declared fields.
//!
//! A model is a serde type implementing [`Model`]; its [`ModelMeta`] declares the fields and
//! table. [`ModelOperations`] filters caller mappings to those fields and delegates to a
//! [`Manager`] (in memory or PostgreSQL).

pub mod case;
pub mod config;
pub mod error;
pub mod fields;
pub mod lookup;
pub mod manager;
pub mod migration;
pub mod model;
pub mod service;
pub mod sql;

pub use config::{resolve, load_from_path, FieldInfo, ModelMeta, ModelRegistry, Settings, ValidationRule};
pub use error::{ConfigError, FailureKind, ModelError, ModelOperationError, Operation, ValidationErrors};
pub use fields::{iterate_fields, CleanData, Kwargs};
pub use manager::{connect, Manager, MemoryManager, MemoryStore, PgManager, QuerySet};
pub use migration::{apply_models, create_table_sql, ensure_table};
pub use model::{Model, Row};
pub use service::{Extra, FieldValidator, ModelOperations, ModelService};
