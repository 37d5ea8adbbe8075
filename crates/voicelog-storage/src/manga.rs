use crate::errors::StorageError;
use crate::journal::bucket_date;
use crate::model::Entity;
use crate::spi::repo::Repository;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use voicelog_types::prelude::Timestamp;

/// One marker per user, overwritten on each generation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MangaMarker {
    pub id: String,
    pub last_generated_at: Timestamp,
}

impl Entity for MangaMarker {
    const COLLECTION: &'static str = "manga_generations";

    fn doc_id(&self) -> &str {
        &self.id
    }
}

/// Once-per-day gate for the optional image generation feature. The day
/// boundary is the configured offset's midnight, not the server's locale.
pub struct MangaStore {
    repo: Arc<dyn Repository<MangaMarker>>,
    offset: FixedOffset,
}

impl MangaStore {
    pub fn new(repo: Arc<dyn Repository<MangaMarker>>, offset: FixedOffset) -> Self {
        Self { repo, offset }
    }

    /// Absent marker means the user has never generated: allowed.
    pub async fn allowed_today(&self, user_id: &str, now: Timestamp) -> Result<bool, StorageError> {
        match self.repo.get(user_id).await? {
            Some(marker) => {
                let last = bucket_date(marker.last_generated_at, self.offset);
                let today = bucket_date(now, self.offset);
                Ok(last != today)
            }
            None => Ok(true),
        }
    }

    pub async fn mark_generated(&self, user_id: &str, now: Timestamp) -> Result<(), StorageError> {
        self.repo
            .upsert(user_id, json!({ "last_generated_at": now }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryRepository, MemoryDatastore};

    fn store() -> MangaStore {
        let datastore = MemoryDatastore::new();
        MangaStore::new(
            Arc::new(InMemoryRepository::<MangaMarker>::new(&datastore)),
            FixedOffset::east_opt(9 * 3600).unwrap(),
        )
    }

    const NOON: i64 = 1_717_210_800_000;
    const SAME_DAY_EVENING: i64 = NOON + 6 * 3_600_000;
    const NEXT_DAY: i64 = NOON + 86_400_000;

    #[tokio::test]
    async fn gate_opens_again_after_midnight() {
        let store = store();

        assert!(store.allowed_today("u1", Timestamp(NOON)).await.unwrap());

        store.mark_generated("u1", Timestamp(NOON)).await.unwrap();
        assert!(!store
            .allowed_today("u1", Timestamp(SAME_DAY_EVENING))
            .await
            .unwrap());

        assert!(store.allowed_today("u1", Timestamp(NEXT_DAY)).await.unwrap());
    }

    #[tokio::test]
    async fn marker_is_per_user() {
        let store = store();
        store.mark_generated("u1", Timestamp(NOON)).await.unwrap();
        assert!(store.allowed_today("u2", Timestamp(NOON)).await.unwrap());
    }
}
