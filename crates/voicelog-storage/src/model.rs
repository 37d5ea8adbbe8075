use serde::{Deserialize, Serialize};

/// A document persisted in one named collection of the store.
pub trait Entity: Sized + serde::de::DeserializeOwned + Serialize + Send + Sync {
    const COLLECTION: &'static str;
    fn doc_id(&self) -> &str;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryParams {
    pub filter: serde_json::Value,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filter: serde_json::json!({}),
            limit: None,
        }
    }
}
