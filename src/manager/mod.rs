//! Managers: the persistence side the operation helper delegates to.

mod memory;
mod postgres;

pub use memory::{MemoryManager, MemoryStore};
pub use postgres::{connect, PgManager};

use crate::error::ModelError;
use crate::fields::CleanData;
use crate::model::Model;
use async_trait::async_trait;

#[async_trait]
pub trait Manager<M: Model>: Send + Sync {
    /// Insert when the object has no primary key or its key is not stored yet, otherwise
    /// update. The object is refreshed from the stored row (generated keys, defaults).
    async fn save(&self, obj: &mut M) -> Result<(), ModelError>;

    /// Objects matching every filter, ordered by primary key.
    async fn fetch(&self, filters: &CleanData, limit: Option<u32>) -> Result<Vec<M>, ModelError>;

    /// Exactly one match.
    async fn get(&self, filters: &CleanData) -> Result<M, ModelError> {
        let mut found = self.fetch(filters, Some(2)).await?;
        match found.len() {
            0 => Err(ModelError::DoesNotExist(M::meta().name.clone())),
            1 => Ok(found.remove(0)),
            _ => {
                let count = self.count(filters).await?;
                Err(ModelError::MultipleObjectsReturned {
                    model: M::meta().name.clone(),
                    count: count as usize,
                })
            }
        }
    }

    async fn count(&self, filters: &CleanData) -> Result<u64, ModelError> {
        Ok(self.fetch(filters, None).await?.len() as u64)
    }
}

/// Lazy result of `filter_objects`: nothing runs until evaluated, and it can be evaluated
/// any number of times.
pub struct QuerySet<'a, M: Model> {
    manager: &'a dyn Manager<M>,
    filters: CleanData,
}

impl<'a, M: Model> QuerySet<'a, M> {
    pub fn new(manager: &'a dyn Manager<M>, filters: CleanData) -> Self {
        QuerySet { manager, filters }
    }

    pub fn filters(&self) -> &CleanData {
        &self.filters
    }

    pub async fn fetch(&self) -> Result<Vec<M>, ModelError> {
        self.manager.fetch(&self.filters, None).await
    }

    pub async fn first(&self) -> Result<Option<M>, ModelError> {
        Ok(self.manager.fetch(&self.filters, Some(1)).await?.into_iter().next())
    }

    pub async fn count(&self) -> Result<u64, ModelError> {
        self.manager.count(&self.filters).await
    }

    pub async fn exists(&self) -> Result<bool, ModelError> {
        Ok(self.first().await?.is_some())
    }
}

impl<M: Model> Clone for QuerySet<'_, M> {
    fn clone(&self) -> Self {
        QuerySet {
            manager: self.manager,
            filters: self.filters.clone(),
        }
    }
}

impl<M: Model> std::fmt::Debug for QuerySet<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &M::meta().name)
            .field("filters", &self.filters)
            .finish()
    }
}
