use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory document store keyed by collection name and document id.
/// Cloning shares the underlying map, so one datastore can back several
/// typed repositories.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, collection: &str, id: &str, value: serde_json::Value) {
        let mut map = self.inner.records.write();
        map.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn fetch(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.inner
            .records
            .read()
            .get(collection)
            .and_then(|m| m.get(id).cloned())
    }

    pub fn remove(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.inner
            .records
            .write()
            .get_mut(collection)
            .and_then(|m| m.remove(id))
    }

    pub fn list(&self, collection: &str) -> Vec<serde_json::Value> {
        self.inner
            .records
            .read()
            .get(collection)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}
