//! EventSender - writes outgoing events to the outbox.
//!
//! `send` is duplicate-safe: sending an event whose id is already stored
//! returns `Ok(false)` and leaves the stored record alone.

use std::sync::Arc;

use sqlx::{Postgres, Transaction};

use crate::adapters::postgres::PostgresEventRepository;
use crate::domain::event_box::{EventProvider, EventRecord, SendEvent};
use crate::domain::foundation::DomainError;
use crate::ports::EventRepository;

/// Stores outgoing events for later delivery.
///
/// # Example
///
/// ```ignore
/// let sender = EventSender::new(outbox_repository);
/// let stored = sender
///     .send(UserCreated { id, name }, EventProvider::MessageBroker, "users.created")
///     .await?;
/// ```
pub struct EventSender<R: ?Sized = dyn EventRepository> {
    repository: Arc<R>,
}

impl<R: ?Sized> Clone for EventSender<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: EventRepository + ?Sized> EventSender<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Store `event` to be delivered through `provider` to `event_path`.
    ///
    /// Returns `false` if an event with the same id was already stored.
    pub async fn send<E: SendEvent>(
        &self,
        event: E,
        provider: EventProvider,
        event_path: &str,
    ) -> Result<bool, DomainError> {
        let record = serialize(event, provider, event_path, self.repository.table_name())?;
        let inserted = self.repository.insert_event(&record).await.map_err(|e| {
            log_insert_error(&record, self.repository.table_name(), &e);
            e
        })?;
        log_duplicate(&record, self.repository.table_name(), inserted);
        Ok(inserted)
    }
}

impl EventSender<PostgresEventRepository> {
    /// Store `event` inside the caller's transaction.
    ///
    /// The outbox record commits or rolls back together with the business write.
    pub async fn send_in_txn<E: SendEvent>(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        event: E,
        provider: EventProvider,
        event_path: &str,
    ) -> Result<bool, DomainError> {
        let table = self.repository.table_name();
        let record = serialize(event, provider, event_path, table)?;
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

fn serialize<E: SendEvent>(
    event: E,
    provider: EventProvider,
    event_path: &str,
    table: &str,
) -> Result<EventRecord, DomainError> {
    let event_id = event.event_id();
    EventRecord::from_event(event, provider, event_path).map_err(|e| {
        tracing::error!(
            event_id = %event_id,
            event_name = E::EVENT_NAME,
            table,
            error = %e,
            "Error while serializing the event to store in the {} table",
            table
        );
        e
    })
}

pub(super) fn log_duplicate(record: &EventRecord, table: &str, inserted: bool) {
    if !inserted {
        tracing::warn!(
            event_id = %record.id,
            event_name = %record.event_name,
            table,
            "The event is already added to the {} table",
            table
        );
    }
}

pub(super) fn log_insert_error(record: &EventRecord, table: &str, error: &DomainError) {
    tracing::error!(
        event_id = %record.id,
        event_name = %record.event_name,
        table,
        error = %error,
        "Error while entering the event to the {} table",
        table
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryEventRepository;
    use crate::domain::event_box::BoxedEvent;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPlaced {
        id: Uuid,
        total_cents: i64,
        coupon: Option<String>,
    }

    impl BoxedEvent for OrderPlaced {
        const EVENT_NAME: &'static str = "OrderPlaced";

        fn event_id(&self) -> Uuid {
            self.id
        }
    }

    impl SendEvent for OrderPlaced {}

    fn order() -> OrderPlaced {
        OrderPlaced {
            id: Uuid::new_v4(),
            total_cents: 1250,
            coupon: None,
        }
    }

    #[tokio::test]
    async fn send_stores_an_eligible_record() {
        let outbox = Arc::new(InMemoryEventRepository::new("Outbox"));
        let sender = EventSender::new(outbox.clone());
        let event = order();

        let stored = sender
            .send(event.clone(), EventProvider::MessageBroker, "orders.placed")
            .await
            .unwrap();

        assert!(stored);
        let record = outbox.get(event.id).await.unwrap();
        assert_eq!(record.event_name, "OrderPlaced");
        assert_eq!(record.event_path, "orders.placed");
        assert_eq!(record.provider, "MessageBroker");
        assert_eq!(record.payload, format!(r#"{{"id":"{}","total_cents":1250}}"#, event.id));
        assert_eq!(record.try_count, 0);
        assert!(!record.is_processed());
    }

    #[tokio::test]
    async fn sending_the_same_event_twice_returns_false() {
        let outbox: Arc<dyn EventRepository> = Arc::new(InMemoryEventRepository::new("Outbox"));
        let sender = EventSender::new(outbox.clone());
        let event = order();

        assert!(sender
            .send(event.clone(), EventProvider::Sms, "+15550100")
            .await
            .unwrap());
        assert!(!sender
            .send(event, EventProvider::Sms, "+15550100")
            .await
            .unwrap());
        assert_eq!(outbox.get_unprocessed_events(10).await.unwrap().len(), 1);
    }
}
