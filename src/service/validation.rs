//! Declarative field validation used by `Model::full_clean`.

use crate::config::{ModelMeta, ValidationRule};
use crate::error::ValidationErrors;
use crate::lookup::values_equal;
use regex::Regex;
use serde_json::{Map, Value};

pub struct FieldValidator;

impl FieldValidator {
    /// Validate a full row: non-nullable fields without a default must have a value, and every
    /// present value must satisfy its rule. All failures are collected.
    pub fn validate(row: &Map<String, Value>, meta: &ModelMeta) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for field in &meta.fields {
            let val = row.get(&field.name).filter(|v| !v.is_null());
            let rule = meta.validation.get(&field.name);
            let required = rule.and_then(|r| r.required).unwrap_or(!field.nullable && !field.has_default());
            if val.is_none() {
                if required {
                    errors.add(&field.name, format!("{} is required", field.name));
                }
                continue;
            }
            if let (Some(v), Some(rule)) = (val, rule) {
                if let Err(msg) = validate_field(&field.name, v, rule) {
                    errors.add(&field.name, msg);
                }
            }
        }
        errors
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), String> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(format!("{} must be at most {} characters", col, max));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(format!("{} must be at least {} characters", col, min));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| format!("invalid pattern for {}", col))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(format!("{} does not match required pattern", col));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| values_equal(v, a)) {
            return Err(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(format!("{} must be at least {}", col, min));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(format!("{} must be at most {}", col, max));
            }
        }
    }
    Ok(())
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), String> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !s.contains('@') || s.len() < 3 {
                    return Err(format!("{} must be a valid email", col));
                }
            }
        }
        "uuid" => {
            if let Some(s) = v.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(format!("{} must be a valid UUID", col));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldInfo;
    use serde_json::json;

    fn meta() -> ModelMeta {
        ModelMeta::new("Author")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("name", "text").not_null())
            .field(FieldInfo::new("email", "text"))
            .field(FieldInfo::new("born", "integer"))
            .field(FieldInfo::new("genre", "text").not_null().default_literal("fiction"))
            .validate(
                "name",
                ValidationRule {
                    max_length: Some(10),
                    pattern: Some("^[A-Z]".into()),
                    ..Default::default()
                },
            )
            .validate("email", ValidationRule { format: Some("email".into()), ..Default::default() })
            .validate("born", ValidationRule { minimum: Some(0.0), maximum: Some(2100.0), ..Default::default() })
            .validate(
                "genre",
                ValidationRule { allowed: Some(vec![json!("fiction"), json!("poetry")]), ..Default::default() },
            )
    }

    fn row(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn valid_row_passes() {
        let errors = FieldValidator::validate(&row(json!({ "name": "Frank", "email": "f@h.com", "born": 1920 })), &meta());
        assert!(errors.is_empty(), "{}", errors);
    }

    #[test]
    fn required_fields_skip_pk_and_defaults() {
        let errors = FieldValidator::validate(&row(json!({ "id": null })), &meta());
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn collects_every_failure() {
        let errors = FieldValidator::validate(
            &row(json!({ "name": "frank herbert", "email": "nope", "born": -1, "genre": "horror" })),
            &meta(),
        );
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["born", "email", "genre", "name"]);
        assert_eq!(errors.get("name").map(|m| m[0].as_str()), Some("name must be at most 10 characters"));
    }
}
