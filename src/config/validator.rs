//! Models file validation: names, primary keys, and references between models.

use crate::config::ModelsConfig;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &ModelsConfig) -> Result<(), ConfigError> {
    let mut model_names = HashSet::new();
    for m in &config.models {
        if !model_names.insert(m.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "model",
                name: m.name.clone(),
            });
        }
    }

    let fields_by_model: HashMap<&str, HashSet<&str>> = config
        .models
        .iter()
        .map(|m| (m.name.as_str(), m.fields.iter().map(|f| f.name.as_str()).collect()))
        .collect();

    for m in &config.models {
        let mut seen = HashSet::new();
        for f in &m.fields {
            if f.name.is_empty() || f.name.contains("__") {
                return Err(ConfigError::Validation(format!(
                    "model {}: invalid field name '{}' (must be non-empty and must not contain '__')",
                    m.name, f.name
                )));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "field",
                    name: format!("{}.{}", m.name, f.name),
                });
            }
        }

        if !seen.contains(m.primary_key.as_str()) {
            return Err(ConfigError::InvalidPrimaryKey {
                model: m.name.clone(),
                field: m.primary_key.clone(),
            });
        }

        for set in &m.unique {
            for col in set {
                if !seen.contains(col.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "unique field",
                        id: format!("{}.{}", m.name, col),
                    });
                }
            }
        }

        for col in m.validation.keys() {
            if !seen.contains(col.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "validation field",
                    id: format!("{}.{}", m.name, col),
                });
            }
        }

        for f in &m.fields {
            let Some(r) = &f.references else { continue };
            let Some(target_fields) = fields_by_model.get(r.model.as_str()) else {
                return Err(ConfigError::MissingReference {
                    kind: "model",
                    id: r.model.clone(),
                });
            };
            if let Some(to) = &r.field {
                if !target_fields.contains(to.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "field",
                        id: format!("{}.{}", r.model, to),
                    });
                }
            }
        }
    }

    Ok(())
}
