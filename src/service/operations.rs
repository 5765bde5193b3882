//! Generic create/update/get/filter over one model.
//!
//! Every operation filters the caller's keyword mapping down to declared fields, delegates to
//! the model and its manager, and turns the expected failures into one [`ModelOperationError`]
//! that `Extra::fail_silently` can suppress.

use crate::error::{ModelError, ModelOperationError, Operation};
use crate::fields::{CleanData, Kwargs};
use crate::manager::{Manager, QuerySet};
use crate::model::Model;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Options passed alongside the keyword mapping. Only `fail_silently` is consulted; `data`
/// carries whatever else the caller sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extra {
    pub fail_silently: bool,
    pub data: Kwargs,
}

impl Extra {
    pub fn silent() -> Self {
        Extra {
            fail_silently: true,
            ..Default::default()
        }
    }

    /// Split a mapping into the `fail_silently` flag (any truthy value) and the rest.
    pub fn from_kwargs(mut kwargs: Kwargs) -> Self {
        let fail_silently = match kwargs.remove("fail_silently") {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) | None => false,
        };
        Extra {
            fail_silently,
            data: kwargs,
        }
    }
}

/// Return `err`, or log it and yield `Ok(None)` when the caller asked for silence.
fn suppress<T>(err: ModelOperationError, extra: &Extra) -> Result<Option<T>, ModelOperationError> {
    if extra.fail_silently {
        tracing::warn!(kind = ?err.kind(), error = %err, "operation failed silently");
        Ok(None)
    } else {
        Err(err)
    }
}

fn missing_parameters<M: Model>() -> ModelOperationError {
    ModelOperationError::MissingParameters {
        model: M::meta().name.clone(),
    }
}

/// Lookup paths such as `name__iexact` survive field filtering but are not attributes; they are
/// skipped here and only declared fields are assigned.
async fn apply_update<M: Model>(manager: &dyn Manager<M>, obj: &mut M, data: &CleanData) -> Result<(), ModelError> {
    let meta = M::meta();
    for (name, value) in data.iter().filter(|(name, _)| meta.has_field(name)) {
        obj.set_field(name, value.clone())?;
    }
    obj.full_clean()?;
    manager.save(obj).await
}

/// The operation helper. Implementors name the model and hand out its manager; the operations
/// themselves are provided.
#[async_trait]
pub trait ModelOperations: Send + Sync {
    type Model: Model;

    fn objects(&self) -> &dyn Manager<Self::Model>;

    /// Keep the pairs of `kwargs` whose key is a declared field or `<field>__...`.
    fn iterate_fields(&self, kwargs: &Kwargs) -> CleanData {
        CleanData::from_kwargs(Self::Model::meta().field_names(), kwargs)
    }

    /// Build, validate and save a new object. Only integrity failures on save are reported
    /// as `OperationFailed`; other errors propagate.
    async fn create_objects(
        &self,
        kwargs: &Kwargs,
        extra: &Extra,
    ) -> Result<Option<Self::Model>, ModelOperationError> {
        let meta = Self::Model::meta();
        let data = self.iterate_fields(kwargs);
        tracing::debug!(model = %meta.name, keys = ?data.keys().collect::<Vec<_>>(), "create_objects");
        if data.is_empty() {
            return suppress(missing_parameters::<Self::Model>(), extra);
        }

        let mut obj = Self::Model::from_clean_data(&data)?;
        obj.full_clean()?;
        match self.objects().save(&mut obj).await {
            Ok(()) => Ok(Some(obj)),
            Err(source @ ModelError::Integrity(_)) => suppress(
                ModelOperationError::OperationFailed {
                    operation: Operation::Save,
                    model: meta.name.clone(),
                    source,
                },
                extra,
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Assign the recognized pairs onto `obj`, validate and save it.
    async fn update_objects<'o>(
        &self,
        obj: &'o mut Self::Model,
        kwargs: &Kwargs,
        extra: &Extra,
    ) -> Result<Option<&'o mut Self::Model>, ModelOperationError> {
        let meta = Self::Model::meta();
        let data = self.iterate_fields(kwargs);
        tracing::debug!(model = %meta.name, keys = ?data.keys().collect::<Vec<_>>(), "update_objects");
        if data.is_empty() {
            return suppress(missing_parameters::<Self::Model>(), extra);
        }

        let result = apply_update(self.objects(), &mut *obj, &data).await;
        match result {
            Ok(()) => Ok(Some(obj)),
            Err(
                source @ (ModelError::Type(_)
                | ModelError::Value(_)
                | ModelError::Validation(_)
                | ModelError::Integrity(_)),
            ) => suppress(
                ModelOperationError::OperationFailed {
                    operation: Operation::Update,
                    model: meta.name.clone(),
                    source,
                },
                extra,
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Exactly one object matching the recognized filters.
    async fn get_object(&self, kwargs: &Kwargs, extra: &Extra) -> Result<Option<Self::Model>, ModelOperationError> {
        let meta = Self::Model::meta();
        let data = self.iterate_fields(kwargs);
        tracing::debug!(model = %meta.name, keys = ?data.keys().collect::<Vec<_>>(), "get_object");
        if data.is_empty() {
            return suppress(missing_parameters::<Self::Model>(), extra);
        }

        match self.objects().get(&data).await {
            Ok(obj) => Ok(Some(obj)),
            Err(ModelError::DoesNotExist(_)) => suppress(
                ModelOperationError::NotFound {
                    model: meta.name.clone(),
                },
                extra,
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Lazy query over the recognized filters. Nothing runs until the result is evaluated.
    fn filter_objects(&self, kwargs: &Kwargs) -> Result<QuerySet<'_, Self::Model>, ModelOperationError> {
        let data = self.iterate_fields(kwargs);
        tracing::debug!(model = %Self::Model::meta().name, keys = ?data.keys().collect::<Vec<_>>(), "filter_objects");
        if data.is_empty() {
            return Err(missing_parameters::<Self::Model>());
        }
        Ok(QuerySet::new(self.objects(), data))
    }
}

/// `ModelOperations` over any manager.
pub struct ModelService<M: Model> {
    manager: Arc<dyn Manager<M>>,
}

impl<M: Model> ModelService<M> {
    pub fn new(manager: impl Manager<M> + 'static) -> Self {
        ModelService {
            manager: Arc::new(manager),
        }
    }

    pub fn from_arc(manager: Arc<dyn Manager<M>>) -> Self {
        ModelService { manager }
    }
}

impl<M: Model> Clone for ModelService<M> {
    fn clone(&self) -> Self {
        ModelService {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<M: Model> ModelOperations for ModelService<M> {
    type Model = M;

    fn objects(&self) -> &dyn Manager<M> {
        self.manager.as_ref()
    }
}
