pub use crate::allowlist::{AddOutcome, AllowListEntry, AllowListStore, DomainDoc, RemoveOutcome};
pub use crate::departments::{DepartmentDoc, DepartmentStore};
pub use crate::errors::StorageError;
pub use crate::journal::{
    distinct_day_count, entries_on, entry_date, latest_per_day, JournalEntry, JournalStore,
    NewJournalEntry,
};
pub use crate::manga::{MangaMarker, MangaStore};
pub use crate::mock::{InMemoryRepository, MemoryDatastore};
pub use crate::model::{Entity, Page, QueryParams};
pub use crate::spi::repo::Repository;
