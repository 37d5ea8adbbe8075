use crate::errors::StorageError;
use crate::model::Entity;
use crate::spi::repo::Repository;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use voicelog_types::prelude::DomainId;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowListEntry {
    pub email: String,
    pub name: String,
}

/// The per-domain document holding the embedded allow-list array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainDoc {
    pub id: String,
    #[serde(default)]
    pub allowed_users: Vec<AllowListEntry>,
}

impl Entity for DomainDoc {
    const COLLECTION: &'static str = "domains";

    fn doc_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddOutcome {
    pub added: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveOutcome {
    pub removed: usize,
    pub total: usize,
}

/// Email membership per domain. Emails are compared case-insensitively at
/// write and read time; the store itself enforces nothing. Add/remove are
/// read-modify-write with no locking: concurrent administrative writers
/// race last-writer-wins.
pub struct AllowListStore {
    repo: Arc<dyn Repository<DomainDoc>>,
}

impl AllowListStore {
    pub fn new(repo: Arc<dyn Repository<DomainDoc>>) -> Self {
        Self { repo }
    }

    async fn current(&self, domain: &DomainId) -> Result<Vec<AllowListEntry>, StorageError> {
        Ok(self
            .repo
            .get(&domain.0)
            .await?
            .map(|doc| doc.allowed_users)
            .unwrap_or_default())
    }

    async fn write_back(
        &self,
        domain: &DomainId,
        users: &[AllowListEntry],
    ) -> Result<(), StorageError> {
        self.repo
            .upsert(&domain.0, json!({ "allowed_users": users }))
            .await?;
        Ok(())
    }

    /// Appends entries whose email is not already present (case-insensitive).
    /// Creates the domain document implicitly when absent.
    pub async fn add_users(
        &self,
        domain: &DomainId,
        entries: Vec<AllowListEntry>,
    ) -> Result<AddOutcome, StorageError> {
        let mut users = self.current(domain).await?;
        let mut existing: HashSet<String> =
            users.iter().map(|u| u.email.to_lowercase()).collect();

        let mut added = 0;
        for entry in entries {
            let key = entry.email.to_lowercase();
            if existing.insert(key) {
                users.push(entry);
                added += 1;
            }
        }

        self.write_back(domain, &users).await?;
        Ok(AddOutcome {
            added,
            total: users.len(),
        })
    }

    pub async fn remove_users(
        &self,
        domain: &DomainId,
        emails: &[String],
    ) -> Result<RemoveOutcome, StorageError> {
        let users = self.current(domain).await?;
        let targets: HashSet<String> = emails.iter().map(|e| e.to_lowercase()).collect();

        let before = users.len();
        let remaining: Vec<AllowListEntry> = users
            .into_iter()
            .filter(|u| !targets.contains(&u.email.to_lowercase()))
            .collect();

        self.write_back(domain, &remaining).await?;
        Ok(RemoveOutcome {
            removed: before - remaining.len(),
            total: remaining.len(),
        })
    }

    pub async fn list_users(
        &self,
        domain: &DomainId,
    ) -> Result<Vec<AllowListEntry>, StorageError> {
        match self.repo.get(&domain.0).await? {
            Some(doc) => Ok(doc.allowed_users),
            None => Err(StorageError::not_found(&format!(
                "domain not found: {domain}"
            ))),
        }
    }

    /// Absent domain or absent email both read as not allowed.
    pub async fn allowed_user(
        &self,
        domain: &DomainId,
        email: &str,
    ) -> Result<Option<AllowListEntry>, StorageError> {
        let users = self.current(domain).await?;
        let needle = email.to_lowercase();
        Ok(users
            .into_iter()
            .find(|u| u.email.to_lowercase() == needle))
    }

    pub async fn is_allowed(&self, domain: &DomainId, email: &str) -> Result<bool, StorageError> {
        Ok(self.allowed_user(domain, email).await?.is_some())
    }
}
