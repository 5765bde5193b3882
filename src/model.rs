//! The model capability: a serde type that knows its descriptor.
//!
//! Serialized field names must match the descriptor's field names; rows move between models
//! and managers as JSON objects.

use crate::config::ModelMeta;
use crate::error::ModelError;
use crate::fields::{CleanData, LOOKUP_SEP};
use crate::service::FieldValidator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// One stored record as a JSON object keyed by field name.
pub type Row = Map<String, Value>;

pub trait Model: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    fn meta() -> &'static ModelMeta;

    /// Build a new, unsaved instance. Keys must be plain declared field names.
    fn from_clean_data(data: &CleanData) -> Result<Self, ModelError> {
        let meta = Self::meta();
        let mut row = Row::new();
        for (k, v) in data {
            if !meta.has_field(k) {
                return Err(ModelError::Type(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    meta.name, k
                )));
            }
            row.insert(k.clone(), v.clone());
        }
        Self::from_row(row)
    }

    fn from_row(row: Row) -> Result<Self, ModelError> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }

    fn to_row(&self) -> Result<Row, ModelError> {
        match serde_json::to_value(self)? {
            Value::Object(row) => Ok(row),
            other => Err(ModelError::Type(format!(
                "{} serialized to {} instead of an object",
                Self::meta().name,
                other
            ))),
        }
    }

    /// Primary key value, `None` while unsaved.
    fn pk(&self) -> Option<Value> {
        let meta = Self::meta();
        self.to_row()
            .ok()?
            .remove(&meta.pk_column)
            .filter(|v| !v.is_null())
    }

    /// Assign one attribute. Lookup paths and undeclared names are type errors; a value that
    /// does not fit the field is a value error.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        let meta = Self::meta();
        if name.contains(LOOKUP_SEP) {
            return Err(ModelError::Type(format!(
                "cannot assign lookup path '{}' on {}",
                name, meta.name
            )));
        }
        if !meta.has_field(name) {
            return Err(ModelError::Type(format!("{} has no field '{}'", meta.name, name)));
        }
        let mut row = self.to_row()?;
        row.insert(name.to_string(), value);
        *self = serde_json::from_value(Value::Object(row))
            .map_err(|e| ModelError::Value(format!("{}.{}: {}", meta.name, name, e)))?;
        Ok(())
    }

    /// Model-wide validation hook, run by `full_clean` after the field rules.
    fn clean(&self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Field rules from the descriptor, then `clean`. Errors are gathered into one
    /// `ModelError::Validation`.
    fn full_clean(&self) -> Result<(), ModelError> {
        let row = self.to_row()?;
        let mut errors = FieldValidator::validate(&row, Self::meta());
        match self.clean() {
            Ok(()) => {}
            Err(ModelError::Validation(more)) => errors.merge(more),
            Err(e) => return Err(e),
        }
        errors.into_result()
    }
}
