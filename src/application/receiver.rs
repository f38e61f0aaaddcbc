//! EventReceiverManager - writes incoming events to the inbox.
//!
//! Transport consumers call one of the `receive*` methods as soon as a
//! message arrives; the inbox dispatch manager hands it to the application
//! later. A message id that is already stored is reported as `Ok(false)`,
//! which lets consumers acknowledge redelivered messages without handling
//! them twice.

use std::sync::Arc;

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::sender::{log_duplicate, log_insert_error};
use crate::adapters::postgres::PostgresEventRepository;
use crate::domain::event_box::{serialize_payload, EventProvider, EventRecord, ReceiveEvent};
use crate::domain::foundation::DomainError;
use crate::ports::EventRepository;

/// Stores incoming events for later handling.
///
/// Stored records are handed to their receivers by
/// [`InboxDispatchManager`](super::InboxDispatchManager).
pub struct EventReceiverManager<R: ?Sized = dyn EventRepository> {
    repository: Arc<R>,
}

impl<R: ?Sized> Clone for EventReceiverManager<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: EventRepository + ?Sized> EventReceiverManager<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Store a typed event received through `provider` at `event_path`.
    ///
    /// Headers and additional data carried by the event are stored in their
    /// own columns.
    pub async fn receive<E: ReceiveEvent>(
        &self,
        event: E,
        provider: EventProvider,
        event_path: &str,
    ) -> Result<bool, DomainError> {
        let record = EventRecord::from_event(event, provider, event_path)
            .map_err(|e| self.serialization_failed::<E>(e))?;
        self.store(record).await
    }

    /// Store a typed event whose metadata arrived already serialized.
    pub async fn receive_with_metadata<E: ReceiveEvent>(
        &self,
        event: E,
        provider: EventProvider,
        event_path: &str,
        headers: Option<String>,
        additional_data: Option<String>,
    ) -> Result<bool, DomainError> {
        let payload =
            serialize_payload(&event).map_err(|e| self.serialization_failed::<E>(e))?;
        let record = EventRecord::new(event.event_id(), provider, E::EVENT_NAME, event_path, payload)
            .with_headers(headers)
            .with_additional_data(additional_data);
        self.store(record).await
    }

    /// Store a message that was never deserialized into a Rust type.
    ///
    /// `payload`, `headers` and `additional_data` are stored as given.
    #[allow(clippy::too_many_arguments)]
    pub async fn receive_raw(
        &self,
        event_name: &str,
        event_path: &str,
        event_id: Uuid,
        provider: EventProvider,
        payload: &str,
        headers: Option<String>,
        additional_data: Option<String>,
    ) -> Result<bool, DomainError> {
        let record = EventRecord::new(event_id, provider, event_name, event_path, payload)
            .with_headers(headers)
            .with_additional_data(additional_data);
        self.store(record).await
    }

    async fn store(&self, record: EventRecord) -> Result<bool, DomainError> {
        let table = self.repository.table_name();
        let inserted = self.repository.insert_event(&record).await.map_err(|e| {
            log_insert_error(&record, table, &e);
            e
        })?;
        log_duplicate(&record, table, inserted);
        Ok(inserted)
    }

    fn serialization_failed<E: ReceiveEvent>(&self, error: DomainError) -> DomainError {
        tracing::error!(
            event_name = E::EVENT_NAME,
            table = self.repository.table_name(),
            error = %error,
            "Error while serializing the received event"
        );
        error
    }
}

impl EventReceiverManager<PostgresEventRepository> {
    /// Store a typed event inside the caller's transaction.
    pub async fn receive_in_txn<E: ReceiveEvent>(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        event: E,
        provider: EventProvider,
        event_path: &str,
    ) -> Result<bool, DomainError> {
        let table = self.repository.table_name();
        let record = EventRecord::from_event(event, provider, event_path)
            .map_err(|e| self.serialization_failed::<E>(e))?;
        let inserted = self
            .repository
            .insert_event_in_txn(txn, &record)
            .await
            .map_err(|e| {
                log_insert_error(&record, table, &e);
                e
            })?;
        log_duplicate(&record, table, inserted);
        Ok(inserted)
    }
}
