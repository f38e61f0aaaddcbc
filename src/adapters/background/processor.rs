//! EventsProcessorService - Background loop running poll cycles for one table.
//!
//! ## Lifecycle
//!
//! 1. [`start`](EventsProcessorService::start) creates the table and its
//!    indexes; a failure here is fatal for the host
//! 2. [`run`](EventsProcessorService::run) repeats "poll cycle, then sleep"
//!    until the shutdown signal turns `true`
//!
//! A failed cycle is logged and retried on the next tick. Shutdown interrupts
//! the sleep and lets the running cycle finish the dispatches it started.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::application::{shutdown, DispatchManager};
use crate::domain::event_box::EventBoxKind;
use crate::domain::foundation::DomainError;

/// Background service that processes one inbox or outbox table.
pub struct EventsProcessorService<K: EventBoxKind> {
    manager: Arc<DispatchManager<K>>,
    poll_delay: Duration,
}

impl<K: EventBoxKind> EventsProcessorService<K> {
    pub fn new(manager: Arc<DispatchManager<K>>, poll_delay: Duration) -> Self {
        Self {
            manager,
            poll_delay,
        }
    }

    /// Ensure the table exists.
    pub async fn start(&self) -> Result<(), DomainError> {
        let repository = self.manager.repository();
        repository.create_table_if_not_exists().await.map_err(|e| {
            tracing::error!(
                table = repository.table_name(),
                error = %e,
                "Could not create the {} table",
                K::NAME
            );
            e
        })
    }

    /// Run poll cycles until shutdown is requested.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let table = self.manager.repository().table_name();
        tracing::info!(
            table,
            poll_delay_ms = self.poll_delay.as_millis() as u64,
            "{} processor started",
            K::NAME
        );

        while !shutdown::is_requested(&shutdown) {
            if let Err(e) = self.manager.execute_unprocessed_events(&shutdown).await {
                tracing::error!(
                    table,
                    error = %e,
                    critical = true,
                    "Something is wrong while trying to {} or update {} events",
                    K::ACTION,
                    K::NAME
                );
            }

            tokio::select! {
                _ = shutdown::requested(shutdown.clone()) => break,
                _ = tokio::time::sleep(self.poll_delay) => {}
            }
        }

        tracing::info!(table, "{} processor stopped", K::NAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryEventRepository;
    use crate::application::ProviderRegistry;
    use crate::domain::event_box::{EventProvider, EventRecord, Outbox};
    use crate::ports::EventRepository;
    use uuid::Uuid;

    fn service(repository: Arc<InMemoryEventRepository>) -> EventsProcessorService<Outbox> {
        let registry = Arc::new(ProviderRegistry::<Outbox>::builder().build());
        let manager = Arc::new(DispatchManager::new(repository, registry));
        EventsProcessorService::new(manager, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_shut_down() {
        let repository = Arc::new(InMemoryEventRepository::new("Outbox"));
        let record = EventRecord::new(Uuid::new_v4(), EventProvider::Sms, "Reminder", "+1", "{}");
        repository.insert_event(&record).await.unwrap();
        let service = service(repository.clone());
        let (tx, rx) = shutdown::channel();
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), service.run(rx))
            .await
            .expect("run should return");

        assert_eq!(repository.get(record.id).await.unwrap().try_count, 0);
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_poll_delay() {
        let repository = Arc::new(InMemoryEventRepository::new("Outbox"));
        let service = Arc::new(service(repository));
        let (tx, rx) = shutdown::channel();

        let handle = {
            let service = service.clone();
            tokio::spawn(async move { service.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("processor should stop promptly")
            .unwrap();
    }
}
