//! CleanupService - Background loop deleting old processed events.
//!
//! Every `interval`, records processed more than `retention` ago are deleted
//! from the table. Unprocessed records are never deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::application::shutdown;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::EventRepository;

/// Background service that sweeps one inbox or outbox table.
pub struct CleanupService {
    repository: Arc<dyn EventRepository>,
    retention: chrono::Duration,
    interval: Duration,
}

impl CleanupService {
    pub fn new(
        repository: Arc<dyn EventRepository>,
        retention: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            retention,
            interval,
        }
    }

    /// Delete records processed before `now - retention`.
    ///
    /// Fails without touching the table when the threshold is out of range.
    pub async fn sweep_once(&self) -> Result<u64, DomainError> {
        let threshold = Utc::now()
            .checked_sub_signed(self.retention)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::ConfigurationError,
                    format!(
                        "Retention of {} days is out of range",
                        self.retention.num_days()
                    ),
                )
                .with_detail("table", self.repository.table_name())
            })?;
        let deleted = self.repository.delete_processed_events(threshold).await?;

        tracing::info!(
            table = self.repository.table_name(),
            deleted,
            processed_before = %threshold,
            "Processed events cleaned up"
        );
        Ok(deleted)
    }

    /// Sweep until shutdown is requested.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let table = self.repository.table_name();
        tracing::info!(
            table,
            retention_days = self.retention.num_days(),
            interval_secs = self.interval.as_secs(),
            "Cleanup service started"
        );

        while !shutdown::is_requested(&shutdown) {
            if let Err(e) = self.sweep_once().await {
                tracing::error!(
                    table,
                    error = %e,
                    critical = true,
                    "Something is wrong while deleting processed events"
                );
            }

            tokio::select! {
                _ = shutdown::requested(shutdown.clone()) => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(table, "Cleanup service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryEventRepository;
    use crate::domain::event_box::{EventProvider, EventRecord};
    use uuid::Uuid;

    fn processed_days_ago(days: i64) -> EventRecord {
        let mut record = EventRecord::new(Uuid::new_v4(), EventProvider::Email, "Welcome", "a@b.c", "{}");
        record.processed_at = Some(Utc::now() - chrono::Duration::days(days));
        record
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_records() {
        let repository = Arc::new(InMemoryEventRepository::new("Outbox"));
        let expired = processed_days_ago(31);
        let recent = processed_days_ago(2);
        let pending = EventRecord::new(Uuid::new_v4(), EventProvider::Email, "Welcome", "a@b.c", "{}");
        for record in [&expired, &recent, &pending] {
            repository.insert_event(record).await.unwrap();
        }
        let service = CleanupService::new(
            repository.clone(),
            chrono::Duration::days(30),
            Duration::from_secs(3600),
        );

        assert_eq!(service.sweep_once().await.unwrap(), 1);
        assert!(repository.get(expired.id).await.is_none());
        assert!(repository.get(recent.id).await.is_some());
        assert!(repository.get(pending.id).await.is_some());
    }

    #[tokio::test]
    async fn out_of_range_retention_is_an_error_not_a_panic() {
        let repository = Arc::new(InMemoryEventRepository::new("Outbox"));
        repository.insert_event(&processed_days_ago(60)).await.unwrap();
        let service = Arc::new(CleanupService::new(
            repository.clone(),
            chrono::Duration::days(200_000_000),
            Duration::from_secs(3600),
        ));

        let result = tokio::spawn({
            let service = service.clone();
            async move { service.sweep_once().await }
        })
        .await
        .expect("sweep should not panic");

        assert_eq!(result.unwrap_err().code, ErrorCode::ConfigurationError);
        assert_eq!(repository.len().await, 1);
    }

    #[tokio::test]
    async fn run_sweeps_before_waiting() {
        let repository = Arc::new(InMemoryEventRepository::new("Inbox"));
        repository.insert_event(&processed_days_ago(60)).await.unwrap();
        let service = Arc::new(CleanupService::new(
            repository.clone(),
            chrono::Duration::days(30),
            Duration::from_secs(3600),
        ));
        let (tx, rx) = shutdown::channel();

        let handle = {
            let service = service.clone();
            tokio::spawn(async move { service.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup should stop promptly")
            .unwrap();

        assert!(repository.is_empty().await);
    }
}
