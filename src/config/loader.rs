//! Load a models file and resolve it into model descriptors.

use crate::config::resolved::{FieldInfo, ModelMeta, ModelRegistry, RelationInfo};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Build the registry from a models config (validates first).
pub fn resolve(config: &ModelsConfig) -> Result<ModelRegistry, ConfigError> {
    validate(config)?;

    // First pass: plain descriptors; relations need every target resolved.
    let mut plain: HashMap<&str, ModelMeta> = HashMap::new();
    for m in &config.models {
        let mut meta = ModelMeta::new(m.name.clone())
            .schema(m.schema.clone().unwrap_or_else(|| config.schema.clone()));
        if let Some(table) = &m.table {
            meta = meta.table(table.clone());
        }
        for f in &m.fields {
            let mut field = FieldInfo::new(f.name.clone(), f.type_.ddl());
            field.nullable = f.nullable;
            field.default = f.default.clone();
            field.unique = f.unique;
            if f.name == m.primary_key {
                field = field.primary_key();
            }
            meta = meta.field(field);
        }
        meta.unique = m.unique.clone();
        meta.validation = m.validation.clone();
        plain.insert(m.name.as_str(), meta);
    }

    let mut models = Vec::with_capacity(config.models.len());
    let mut by_name = HashMap::new();
    for m in &config.models {
        let mut meta = plain
            .get(m.name.as_str())
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: m.name.clone(),
            })?;
        for f in &m.fields {
            let Some(r) = &f.references else { continue };
            let target = plain.get(r.model.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: r.model.clone(),
            })?;
            let relation = RelationInfo {
                model: target.name.clone(),
                schema_name: target.schema_name.clone(),
                table_name: target.table_name.clone(),
                to_field: r.field.clone().unwrap_or_else(|| target.pk_column.clone()),
                fields: target.fields.iter().map(FieldInfo::without_relation).collect(),
            };
            if let Some(field) = meta.fields.iter_mut().find(|x| x.name == f.name) {
                field.relation = Some(relation);
            }
        }
        tracing::debug!(model = %meta.name, table = %meta.table_name, fields = meta.fields.len(), "resolved model");
        by_name.insert(meta.name.clone(), meta.clone());
        models.push(meta);
    }

    Ok(ModelRegistry { models, by_name })
}

pub fn from_json_str(s: &str) -> Result<ModelRegistry, ConfigError> {
    let config: ModelsConfig = serde_json::from_str(s)?;
    resolve(&config)
}

/// Read and resolve a models file from disk.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ModelRegistry, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    from_json_str(&raw)
}
