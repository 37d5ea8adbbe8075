use super::datastore::MemoryDatastore;
use crate::errors::StorageError;
use crate::model::{Entity, Page, QueryParams};
use crate::spi::repo::Repository;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::marker::PhantomData;

#[derive(Clone)]
pub struct InMemoryRepository<E: Entity> {
    store: MemoryDatastore,
    collection: &'static str,
    _marker: PhantomData<E>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new(store: &MemoryDatastore) -> Self {
        Self {
            store: store.clone(),
            collection: E::COLLECTION,
            _marker: PhantomData,
        }
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_patch(target_map.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, value) => {
            *slot = value.clone();
        }
    }
}

fn matches_filter(value: &Value, filter: &Value) -> bool {
    match (value, filter) {
        (Value::Object(data), Value::Object(filter_map)) => filter_map.iter().all(|(k, expected)| {
            data.get(k)
                .map(|actual| actual == expected)
                .unwrap_or(false)
        }),
        (_, Value::Null) => true,
        _ => true,
    }
}

#[async_trait]
impl<E> Repository<E> for InMemoryRepository<E>
where
    E: Entity + Send + Sync,
{
    async fn create(&self, entity: &E) -> Result<(), StorageError> {
        if self.store.fetch(self.collection, entity.doc_id()).is_some() {
            return Err(StorageError::conflict("document already exists"));
        }
        let value =
            serde_json::to_value(entity).map_err(|e| StorageError::internal(&e.to_string()))?;
        self.store.store(self.collection, entity.doc_id(), value);
        Ok(())
    }

    async fn upsert(&self, id: &str, patch: Value) -> Result<E, StorageError> {
        let mut base = self
            .store
            .fetch(self.collection, id)
            .unwrap_or_else(|| Value::Object(Map::new()));
        merge_patch(&mut base, &patch);
        let mut map = base.as_object().cloned().unwrap_or_default();
        map.insert("id".into(), Value::String(id.to_string()));
        let normalized = Value::Object(map);
        let entity: E = serde_json::from_value(normalized.clone())
            .map_err(|e| StorageError::internal(&e.to_string()))?;
        self.store.store(self.collection, id, normalized);
        Ok(entity)
    }

    async fn get(&self, id: &str) -> Result<Option<E>, StorageError> {
        match self.store.fetch(self.collection, id) {
            Some(val) => Ok(Some(
                serde_json::from_value(val).map_err(|e| StorageError::internal(&e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn select(&self, params: QueryParams) -> Result<Page<E>, StorageError> {
        let values = self.store.list(self.collection);
        let limit = params.limit.unwrap_or(u32::MAX) as usize;
        let mut items = Vec::new();
        for value in values {
            if !matches_filter(&value, &params.filter) {
                continue;
            }
            let entity: E = serde_json::from_value(value)
                .map_err(|e| StorageError::internal(&e.to_string()))?;
            items.push(entity);
            if items.len() >= limit {
                break;
            }
        }
        Ok(Page { items, next: None })
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.store
            .remove(self.collection, id)
            .ok_or_else(|| StorageError::not_found("document not found"))?;
        Ok(())
    }
}
