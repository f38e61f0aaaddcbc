//! EventRepository port - Interface for the inbox/outbox tables.
//!
//! This port is the storage half of the Transactional Outbox (and Inbox)
//! Pattern:
//!
//! 1. A sender/receiver inserts an `EventRecord` in the same transaction as
//!    the business change
//! 2. The dispatch manager polls eligible records, hands them to handlers
//!    and writes back the retry state
//! 3. The cleanup service deletes records processed long ago
//!
//! One repository instance serves exactly one table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::event_box::EventRecord;
use crate::domain::foundation::DomainError;

/// Port for reading and writing one event table.
///
/// Implementations must:
/// - Treat a second insert of the same id as "already recorded", not an error
/// - Only return records with `processed_at IS NULL AND try_after_at <= now`
///   from [`get_unprocessed_events`](Self::get_unprocessed_events), oldest first
/// - Never clear or change `processed_at` once it is stored
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Name of the table this repository reads and writes.
    fn table_name(&self) -> &str;

    /// Create the table and its indexes if they do not exist yet.
    async fn create_table_if_not_exists(&self) -> Result<(), DomainError>;

    /// Insert a new record.
    ///
    /// Returns `false` if a record with the same id already exists.
    async fn insert_event(&self, record: &EventRecord) -> Result<bool, DomainError>;

    /// Get up to `limit` eligible records ordered by `created_at` ascending.
    async fn get_unprocessed_events(&self, limit: u32) -> Result<Vec<EventRecord>, DomainError>;

    /// Persist `try_count`, `try_after_at` and `processed_at` of one record.
    ///
    /// Returns whether a row was affected.
    async fn update_event(&self, record: &EventRecord) -> Result<bool, DomainError>;

    /// Persist the retry state of many records in one call.
    ///
    /// Returns whether any row was affected.
    async fn update_events(&self, records: &[EventRecord]) -> Result<bool, DomainError>;

    /// Delete records processed before `processed_before`.
    ///
    /// Returns the number of deleted records.
    async fn delete_processed_events(
        &self,
        processed_before: DateTime<Utc>,
    ) -> Result<u64, DomainError>;
}
