use crate::errors::StorageError;
use crate::model::Entity;
use crate::spi::repo::Repository;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use voicelog_types::prelude::DomainId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepartmentDoc {
    pub id: String,
    #[serde(default)]
    pub departments: Vec<String>,
}

impl Entity for DepartmentDoc {
    const COLLECTION: &'static str = "domain_departments";

    fn doc_id(&self) -> &str {
        &self.id
    }
}

/// Tenant-specific department names offered in the submission form.
pub struct DepartmentStore {
    repo: Arc<dyn Repository<DepartmentDoc>>,
}

impl DepartmentStore {
    pub fn new(repo: Arc<dyn Repository<DepartmentDoc>>) -> Self {
        Self { repo }
    }

    /// Empty when the domain has no department document.
    pub async fn list(&self, domain: &DomainId) -> Result<Vec<String>, StorageError> {
        Ok(self
            .repo
            .get(&domain.0)
            .await?
            .map(|doc| doc.departments)
            .unwrap_or_default())
    }

    /// Replaces the whole list, dropping duplicates while keeping first-seen order.
    pub async fn set(&self, domain: &DomainId, names: Vec<String>) -> Result<(), StorageError> {
        let mut seen = HashSet::new();
        let departments: Vec<String> = names
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();
        self.repo
            .upsert(&domain.0, json!({ "departments": departments }))
            .await?;
        Ok(())
    }
}
