//! Typed errors: the domain error returned by the operation helper, the model-layer error
//! raised by models and managers, and config errors.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: model {model} field {field}")]
    InvalidPrimaryKey { model: String, field: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Field name to messages, collected by `Model::full_clean`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

/// Key used for errors that are not tied to one field (from `Model::clean`).
pub const NON_FIELD_ERRORS: &str = "__all__";

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ModelError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for m in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, m)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors raised by models and managers. The operation helper decides which of these are
/// reportable (wrapped into [`ModelOperationError`]) and which propagate as-is.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Unknown attribute or a value that cannot build the model at all.
    #[error("type error: {0}")]
    Type(String),
    #[error("value error: {0}")]
    Value(String),
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    /// Unique, not-null, foreign-key or check constraint rejected by the store.
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("{0} matching query does not exist")]
    DoesNotExist(String),
    #[error("get() returned more than one {model} -- it returned {count}")]
    MultipleObjectsReturned { model: String, count: usize },
    /// Lookup that cannot be resolved against the model's fields.
    #[error("field error: {0}")]
    Field(String),
    /// Store failure outside the categories above (e.g. a poisoned lock).
    #[error("store: {0}")]
    Store(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Type(e.to_string())
    }
}

/// Operation named in the failure message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Save,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Save => "save",
            Operation::Update => "update",
        })
    }
}

/// Cause behind a [`ModelOperationError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Integrity,
    Invalid,
    NotFound,
    MissingParameters,
    /// Propagated model-layer error that the helper does not handle.
    Unhandled,
}

/// The single reportable error of the operation helper.
#[derive(Error, Debug)]
pub enum ModelOperationError {
    #[error("Failed to {operation} {model}")]
    OperationFailed {
        operation: Operation,
        model: String,
        #[source]
        source: ModelError,
    },
    #[error("{model} object not found")]
    NotFound { model: String },
    #[error("Missing parameters for {model}")]
    MissingParameters { model: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ModelOperationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ModelOperationError::OperationFailed { source, .. } => match source {
                ModelError::Integrity(_) => FailureKind::Integrity,
                _ => FailureKind::Invalid,
            },
            ModelOperationError::NotFound { .. } => FailureKind::NotFound,
            ModelOperationError::MissingParameters { .. } => FailureKind::MissingParameters,
            ModelOperationError::Model(_) => FailureKind::Unhandled,
        }
    }
}
