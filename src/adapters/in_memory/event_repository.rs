//! In-memory EventRepository.
//!
//! Mirrors the PostgreSQL semantics (duplicate-safe insert, eligibility
//! filter, oldest-first ordering, write-once `processed_at`) without a
//! database. Useful for tests and for hosts that embed the dispatch loop
//! without durable storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::event_box::EventRecord;
use crate::domain::foundation::DomainError;
use crate::ports::EventRepository;

/// In-memory event table.
///
/// # Example
///
/// ```ignore
/// let outbox = Arc::new(InMemoryEventRepository::new("Outbox"));
/// let sender = EventSender::new(outbox.clone());
/// sender.send(event, EventProvider::MessageBroker, "users.created").await?;
///
/// assert_eq!(outbox.len().await, 1);
/// ```
pub struct InMemoryEventRepository {
    table_name: String,
    records: RwLock<Vec<EventRecord>>,
}

impl InMemoryEventRepository {
    /// Creates a new empty table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    // === Test Helpers ===

    /// Returns the stored record with `id`.
    pub async fn get(&self, id: Uuid) -> Option<EventRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    /// Returns every stored record in insertion order.
    pub async fn records(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_table_if_not_exists(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn insert_event(&self, record: &EventRecord) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn get_unprocessed_events(&self, limit: u32) -> Result<Vec<EventRecord>, DomainError> {
        let now = Utc::now();
        let mut eligible: Vec<EventRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_eligible(now))
            .cloned()
            .collect();

        // Stable sort keeps insertion order between equal timestamps
        eligible.sort_by_key(|r| r.created_at);
        eligible.truncate(limit as usize);
        Ok(eligible)
    }

    async fn update_event(&self, record: &EventRecord) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        Ok(apply_update(&mut records, record))
    }

    async fn update_events(&self, updates: &[EventRecord]) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        let mut any = false;
        for update in updates {
            any |= apply_update(&mut records, update);
        }
        Ok(any)
    }

    async fn delete_processed_events(
        &self,
        processed_before: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !matches!(r.processed_at, Some(at) if at < processed_before));
        Ok((before - records.len()) as u64)
    }
}

fn apply_update(records: &mut [EventRecord], update: &EventRecord) -> bool {
    match records.iter_mut().find(|r| r.id == update.id) {
        Some(stored) => {
            stored.try_count = update.try_count;
            stored.try_after_at = update.try_after_at;
            if stored.processed_at.is_none() {
                stored.processed_at = update.processed_at;
            }
            true
        }
        None => false,
    }
}
