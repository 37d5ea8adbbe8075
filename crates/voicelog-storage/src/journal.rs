use crate::errors::StorageError;
use crate::model::{Entity, QueryParams};
use crate::spi::repo::Repository;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use voicelog_types::prelude::{DomainId, Id, Timestamp};

/// One submission: the user's input plus the workflow-derived answer
/// fields. Append-only; never mutated or deleted by the application.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    #[serde(default)]
    pub domain: Option<DomainId>,
    pub user_id: String,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    pub department: String,
    pub mood_score: u8,
    pub mood_reason: String,
    #[serde(default)]
    pub llm_feeling: String,
    #[serde(default)]
    pub llm_checkpoint: String,
    #[serde(default)]
    pub llm_next_step: String,
    pub created_at: Timestamp,
}

impl Entity for JournalEntry {
    const COLLECTION: &'static str = "voicelogs";

    fn doc_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug)]
pub struct NewJournalEntry {
    pub domain: Option<DomainId>,
    pub user_id: String,
    pub user_display_name: Option<String>,
    pub user_email: Option<String>,
    pub department: String,
    pub mood_score: u8,
    pub mood_reason: String,
    pub llm_feeling: String,
    pub llm_checkpoint: String,
    pub llm_next_step: String,
}

pub struct JournalStore {
    repo: Arc<dyn Repository<JournalEntry>>,
}

impl JournalStore {
    pub fn new(repo: Arc<dyn Repository<JournalEntry>>) -> Self {
        Self { repo }
    }

    /// Assigns the id and the server timestamp. Scores outside 1..=5 are
    /// rejected before anything is written.
    pub async fn append(
        &self,
        new: NewJournalEntry,
        now: Timestamp,
    ) -> Result<JournalEntry, StorageError> {
        if !(1..=5).contains(&new.mood_score) {
            return Err(StorageError::bad_request(&format!(
                "mood score out of range: {}",
                new.mood_score
            )));
        }
        if new.department.is_empty() {
            return Err(StorageError::bad_request("department must not be empty"));
        }

        let entry = JournalEntry {
            id: Id::new_random().0,
            domain: new.domain,
            user_id: new.user_id,
            user_display_name: new.user_display_name,
            user_email: new.user_email,
            department: new.department,
            mood_score: new.mood_score,
            mood_reason: new.mood_reason,
            llm_feeling: new.llm_feeling,
            llm_checkpoint: new.llm_checkpoint,
            llm_next_step: new.llm_next_step,
            created_at: now,
        };
        self.repo.create(&entry).await?;
        Ok(entry)
    }

    /// The full set for one user, oldest first. All date bucketing is
    /// derived from this set in memory; the store performs no grouping.
    pub async fn all_for_user(&self, user_id: &str) -> Result<Vec<JournalEntry>, StorageError> {
        let page = self
            .repo
            .select(QueryParams {
                filter: json!({ "user_id": user_id }),
                limit: None,
            })
            .await?;
        let mut entries = page.items;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

/// Calendar date of an entry under the configured midnight boundary.
pub fn entry_date(entry: &JournalEntry, offset: FixedOffset) -> NaiveDate {
    bucket_date(entry.created_at, offset)
}

pub fn bucket_date(ts: Timestamp, offset: FixedOffset) -> NaiveDate {
    DateTime::from_timestamp_millis(ts.0)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive()
}

pub fn distinct_day_count(entries: &[JournalEntry], offset: FixedOffset) -> usize {
    let days: std::collections::HashSet<NaiveDate> =
        entries.iter().map(|e| entry_date(e, offset)).collect();
    days.len()
}

pub fn entries_on<'a>(
    entries: &'a [JournalEntry],
    date: NaiveDate,
    offset: FixedOffset,
) -> Vec<&'a JournalEntry> {
    entries
        .iter()
        .filter(|e| entry_date(e, offset) == date)
        .collect()
}

/// Calendar view: when a day has several entries, the latest one wins.
pub fn latest_per_day(
    entries: &[JournalEntry],
    offset: FixedOffset,
) -> BTreeMap<NaiveDate, &JournalEntry> {
    let mut days: BTreeMap<NaiveDate, &JournalEntry> = BTreeMap::new();
    for entry in entries {
        let date = entry_date(entry, offset);
        match days.get(&date) {
            Some(existing) if existing.created_at > entry.created_at => {}
            _ => {
                days.insert(date, entry);
            }
        }
    }
    days
}
