use crate::errors::StorageError;
use crate::model::{Entity, Page, QueryParams};
use async_trait::async_trait;

/// Plain document CRUD over one collection. Backends provide no indexing,
/// no transactions and no ordering guarantees; callers that need
/// aggregation read the full set and derive it in memory.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn create(&self, entity: &E) -> Result<(), StorageError>;
    async fn upsert(&self, id: &str, patch: serde_json::Value) -> Result<E, StorageError>;
    async fn get(&self, id: &str) -> Result<Option<E>, StorageError>;
    async fn select(&self, params: QueryParams) -> Result<Page<E>, StorageError>;
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
