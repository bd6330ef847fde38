//! Bounded, persisted history of past analyses.
//!
//! The [`HistoryStore`] owns every [`HistoryItem`]. Items are kept newest
//! first and never exceed the configured capacity; recording past capacity
//! evicts the oldest entry. Every mutation writes the full sequence to the
//! [`KeyValueStore`] under [`HISTORY_KEY`].
//!
//! Storage problems never interrupt the caller. A write failure is logged
//! and the in-memory list stays authoritative for the running process; an
//! unreadable snapshot at startup is logged and treated as an empty history.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{preview_summary, AnalysisResult, HistoryItem};
use crate::storage::{KeyValueStore, HISTORY_KEY};

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 20;

pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    items: Vec<HistoryItem>,
    capacity: usize,
}

impl HistoryStore {
    /// Create an empty store. Call [`hydrate`](Self::hydrate) to load the
    /// persisted snapshot.
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            items: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Create a store and load the persisted snapshot.
    pub fn open(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut history = Self::new(store, capacity);
        history.hydrate();
        history
    }

    /// Replace the in-memory list with the persisted snapshot.
    ///
    /// Any read or parse failure resets the list to empty.
    pub fn hydrate(&mut self) {
        match self.read_snapshot() {
            Ok(mut items) => {
                items.truncate(self.capacity);
                tracing::debug!(count = items.len(), "history hydrated");
                self.items = items;
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable history");
                self.items.clear();
            }
        }
    }

    fn read_snapshot(&self) -> Result<Vec<HistoryItem>, StoreError> {
        let raw = self
            .store
            .get(HISTORY_KEY)
            .map_err(|e| StoreError::HistoryCorrupt(e.to_string()))?;
        match raw {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| StoreError::HistoryCorrupt(e.to_string())),
        }
    }

    fn persist(&self) {
        if let Err(e) = self.write_snapshot() {
            tracing::warn!(error = %e, "history not persisted; keeping in-memory copy");
        }
    }

    fn write_snapshot(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.items)
            .map_err(|e| StoreError::PersistFailed(e.to_string()))?;
        self.store
            .set(HISTORY_KEY, &json)
            .map_err(|e| StoreError::PersistFailed(e.to_string()))
    }

    /// Wrap `result` in a new [`HistoryItem`], prepend it, evict past
    /// capacity, and persist. Returns the new item.
    pub fn record(&mut self, result: AnalysisResult) -> HistoryItem {
        let item = HistoryItem {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            summary: preview_summary(&result.summary),
            data: result,
            user_rating: 0,
        };

        self.items.insert(0, item.clone());
        self.items.truncate(self.capacity);
        self.persist();

        tracing::info!(id = %item.id, "analysis recorded to history");
        item
    }

    /// Set the rating of the item with `id`. Unknown ids are ignored.
    ///
    /// Returns whether an item was updated.
    pub fn rate(&mut self, id: &str, rating: i32) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            tracing::debug!(id, "rating ignored; no such history item");
            return false;
        };
        item.user_rating = rating;
        self.persist();
        true
    }

    /// Newest-first view of the history, optionally filtered by a
    /// case-insensitive substring of the display summary or the detected
    /// language.
    pub fn load(&self, filter: Option<&str>) -> Vec<&HistoryItem> {
        let needle = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        match needle {
            None => self.items.iter().collect(),
            Some(needle) => self
                .items
                .iter()
                .filter(|item| {
                    item.summary.to_lowercase().contains(&needle)
                        || item.data.language.to_lowercase().contains(&needle)
                })
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttachmentProfile, RiskLevel};
    use crate::storage::MemoryStore;

    fn result(summary: &str, language: &str) -> AnalysisResult {
        AnalysisResult {
            summary: summary.to_string(),
            language: language.to_string(),
            risk_level: RiskLevel::Low,
            defense_mechanisms: vec![],
            attachment_profile: AttachmentProfile::default(),
            emotional_triggers: vec![],
            themes: vec![],
            sentiment_trend: vec![],
            emotion_trend: vec![],
            therapy_recommendations: vec![],
            key_quotes: vec![],
            academic_notes: String::new(),
        }
    }

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn record_prepends_and_caps() {
        let mut history = HistoryStore::new(memory(), DEFAULT_CAPACITY);
        for i in 0..25 {
            history.record(result(&format!("summary {}", i), "English"));
        }

        assert_eq!(history.len(), 20);
        let items = history.load(None);
        assert_eq!(items[0].data.summary, "summary 24");
        assert_eq!(items[19].data.summary, "summary 5");
    }

    #[test]
    fn record_assigns_fresh_ids_for_identical_results() {
        let mut history = HistoryStore::new(memory(), DEFAULT_CAPACITY);
        let a = history.record(result("same", "English"));
        let b = history.record(result("same", "English"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.summary, "same...");
        assert_eq!(a.user_rating, 0);
    }

    #[test]
    fn rate_updates_and_persists() {
        let store = memory();
        let mut history = HistoryStore::new(store.clone(), DEFAULT_CAPACITY);
        let item = history.record(result("rated", "English"));

        assert!(history.rate(&item.id, 4));
        assert_eq!(history.get(&item.id).unwrap().user_rating, 4);

        let reloaded = HistoryStore::open(store, DEFAULT_CAPACITY);
        assert_eq!(reloaded.get(&item.id).unwrap().user_rating, 4);
    }

    #[test]
    fn rate_unknown_id_is_noop() {
        let mut history = HistoryStore::new(memory(), DEFAULT_CAPACITY);
        history.record(result("one", "English"));
        assert!(!history.rate("missing", 5));
        assert_eq!(history.load(None)[0].user_rating, 0);
    }

    #[test]
    fn load_filters_by_summary_or_language() {
        let mut history = HistoryStore::new(memory(), DEFAULT_CAPACITY);
        history.record(result("Client describes Anxiety at work", "English"));
        history.record(result("Клиент говорит о семье", "Russian"));

        assert_eq!(history.load(Some("anxiety")).len(), 1);
        assert_eq!(history.load(Some("RUSS")).len(), 1);
        assert_eq!(history.load(Some("")).len(), 2);
        assert!(history.load(Some("nothing")).is_empty());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn corrupt_snapshot_hydrates_empty() {
        let store = memory();
        store.set(HISTORY_KEY, "{not json").unwrap();
        let history = HistoryStore::open(store, DEFAULT_CAPACITY);
        assert!(history.is_empty());
    }

    #[test]
    fn wrong_shape_snapshot_hydrates_empty() {
        let store = memory();
        store.set(HISTORY_KEY, r#"{"items": []}"#).unwrap();
        let history = HistoryStore::open(store, DEFAULT_CAPACITY);
        assert!(history.is_empty());
    }

    #[test]
    fn oversized_snapshot_is_truncated() {
        let store = memory();
        let mut big = HistoryStore::new(store.clone(), 30);
        for i in 0..30 {
            big.record(result(&format!("s{}", i), "English"));
        }
        let history = HistoryStore::open(store, DEFAULT_CAPACITY);
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.load(None)[0].data.summary, "s29");
    }

    #[test]
    fn persist_failure_keeps_memory_state() {
        let store = memory();
        let mut history = HistoryStore::new(store.clone(), DEFAULT_CAPACITY);
        store.fail_writes(true);
        let item = history.record(result("kept", "English"));
        assert_eq!(history.get(&item.id).unwrap().data.summary, "kept");

        let reloaded = HistoryStore::open(store, DEFAULT_CAPACITY);
        assert!(reloaded.is_empty());
    }
}
