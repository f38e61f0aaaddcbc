//! DispatchManager - one poll cycle over an inbox or outbox table.
//!
//! A cycle fetches the oldest eligible records, dispatches them concurrently
//! (bounded by a semaphore) to the handlers found in the [`ProviderRegistry`],
//! and persists the retry state of every record it touched in one bulk update.
//!
//! Every dispatch attempt ends in exactly one [`DispatchOutcome`], and only
//! [`DispatchOutcome::apply`] changes the record, so an attempt is counted once
//! no matter where it failed.
//!
//! | Outcome | Record change |
//! |---------|---------------|
//! | Handler returned `true` | `processed()` |
//! | Handler returned `false` | `increase_try_count()` |
//! | Handler error, timeout or panic | `failed(try_count, try_after_minutes)` |
//! | No handler / provider mismatch | `failed(0, 1 day)` |

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{watch, Semaphore};

use super::registry::{ProviderRegistry, RegisteredHandler, Resolution};
use super::shutdown;
use crate::config::EventBoxConfig;
use crate::domain::event_box::{EventBoxKind, EventRecord, Inbox, Outbox};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::EventRepository;

/// Retry delay of records nobody can handle.
pub const TRY_AFTER_ONE_DAY_MINUTES: u32 = 24 * 60;

/// Configuration for a DispatchManager.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Maximum dispatches in flight.
    pub max_concurrency: usize,

    /// Maximum records fetched per cycle.
    pub batch_size: u32,

    /// Failed attempts before the retry delay applies.
    pub try_count: u32,

    /// Retry delay in minutes.
    pub try_after_minutes: u32,

    /// Deadline for one handler invocation.
    pub handler_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            batch_size: 1000,
            try_count: 10,
            try_after_minutes: 5,
            handler_timeout: None,
        }
    }
}

impl DispatchConfig {
    /// Create config with custom concurrency limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Create config with custom retry policy.
    pub fn with_retry(mut self, try_count: u32, try_after_minutes: u32) -> Self {
        self.try_count = try_count;
        self.try_after_minutes = try_after_minutes;
        self
    }

    /// Create config with a handler deadline.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

impl From<&EventBoxConfig> for DispatchConfig {
    fn from(config: &EventBoxConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency as usize,
            batch_size: config.batch_size,
            try_count: config.try_count,
            try_after_minutes: config.try_after_minutes,
            handler_timeout: config.handler_timeout(),
        }
    }
}

/// How one dispatch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler accepted the event.
    Processed,
    /// The handler asked for a later retry.
    Retry,
    /// The handler failed, timed out or panicked.
    Failed,
    /// No handler accepts the event's name and provider.
    Unroutable,
}

impl DispatchOutcome {
    /// Record the attempt on `record`.
    pub fn apply(self, record: &mut EventRecord, config: &DispatchConfig) {
        match self {
            DispatchOutcome::Processed => record.processed(),
            DispatchOutcome::Retry => record.increase_try_count(),
            DispatchOutcome::Failed => record.failed(config.try_count, config.try_after_minutes),
            DispatchOutcome::Unroutable => record.failed(0, TRY_AFTER_ONE_DAY_MINUTES),
        }
    }
}

/// Counts of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub fetched: usize,
    pub processed: usize,
    pub retried: usize,
    pub failed: usize,
    pub unroutable: usize,
    /// Records left untouched because the cycle was cancelled.
    pub skipped: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: Option<DispatchOutcome>) {
        match outcome {
            Some(DispatchOutcome::Processed) => self.processed += 1,
            Some(DispatchOutcome::Retry) => self.retried += 1,
            Some(DispatchOutcome::Failed) => self.failed += 1,
            Some(DispatchOutcome::Unroutable) => self.unroutable += 1,
            None => self.skipped += 1,
        }
    }

    /// Records whose state changed and was persisted.
    pub fn touched(&self) -> usize {
        self.fetched - self.skipped
    }
}

/// Runs poll cycles for one table.
pub struct DispatchManager<K: EventBoxKind> {
    repository: Arc<dyn EventRepository>,
    registry: Arc<ProviderRegistry<K>>,
    config: DispatchConfig,
}

/// Publishes pending outbox records.
pub type OutboxDispatchManager = DispatchManager<Outbox>;

/// Hands pending inbox records to their receivers.
///
/// Records get into the inbox through [`EventReceiverManager`](super::EventReceiverManager).
pub type InboxDispatchManager = DispatchManager<Inbox>;

impl<K: EventBoxKind> DispatchManager<K> {
    /// Create a new DispatchManager with default configuration.
    pub fn new(repository: Arc<dyn EventRepository>, registry: Arc<ProviderRegistry<K>>) -> Self {
        Self::with_config(repository, registry, DispatchConfig::default())
    }

    /// Create a new DispatchManager with custom configuration.
    pub fn with_config(
        repository: Arc<dyn EventRepository>,
        registry: Arc<ProviderRegistry<K>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            repository,
            registry,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn EventRepository> {
        &self.repository
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one poll cycle.
    ///
    /// Stops starting new dispatches once `cancel` turns `true`; records that
    /// were not started keep their state and are not written back. Errors of
    /// single dispatches never fail the cycle; fetch and update errors do.
    pub async fn execute_unprocessed_events(
        &self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<DispatchSummary, DomainError> {
        let table = self.repository.table_name();
        let mut records = self
            .repository
            .get_unprocessed_events(self.config.batch_size)
            .await?;

        let mut summary = DispatchSummary {
            fetched: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(summary);
        }

        let semaphore = Semaphore::new(self.config.max_concurrency.max(1));
        let outcomes = join_all(
            records
                .iter_mut()
                .map(|record| self.run_one(record, &semaphore, cancel)),
        )
        .await;

        for outcome in &outcomes {
            summary.record(*outcome);
        }

        let touched: Vec<EventRecord> = records
            .into_iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.is_some())
            .map(|(record, _)| record)
            .collect();

        if !touched.is_empty() {
            self.repository.update_events(&touched).await?;
        }

        tracing::debug!(
            table,
            fetched = summary.fetched,
            processed = summary.processed,
            retried = summary.retried,
            failed = summary.failed,
            unroutable = summary.unroutable,
            skipped = summary.skipped,
            "Dispatch cycle finished"
        );

        Ok(summary)
    }

    /// Wait for a slot, dispatch and apply the outcome.
    ///
    /// Returns `None` if cancellation won before the dispatch started.
    async fn run_one(
        &self,
        record: &mut EventRecord,
        semaphore: &Semaphore,
        cancel: &watch::Receiver<bool>,
    ) -> Option<DispatchOutcome> {
        let _permit = tokio::select! {
            biased;
            _ = shutdown::requested(cancel.clone()) => return None,
            permit = semaphore.acquire() => permit.ok()?,
        };
        if shutdown::is_requested(cancel) {
            return None;
        }

        let outcome = self.dispatch(record).await;
        outcome.apply(record, &self.config);
        Some(outcome)
    }

    /// Find the handler of `record`.
    ///
    /// Fails with `HandlerNotFound` when nothing handles the event name, or
    /// `ProviderMismatch` when it is only handled under other providers.
    fn route(&self, record: &EventRecord) -> Result<&RegisteredHandler, DomainError> {
        match self.registry.resolve(&record.event_name, record.provider()) {
            Resolution::Typed(handler) | Resolution::Global(handler) => Ok(handler),
            Resolution::ProviderMismatch { configured } => {
                let configured: Vec<&str> = configured.iter().map(|p| p.as_str()).collect();
                Err(DomainError::new(
                    ErrorCode::ProviderMismatch,
                    format!(
                        "The {} event {} was stored with the {} provider, but it is configured to {} with {:?}",
                        K::NAME,
                        record.id,
                        record.provider,
                        K::ACTION,
                        configured
                    ),
                )
                .with_detail("provider", record.provider.as_str())
                .with_detail("configured", configured.join(",")))
            }
            Resolution::NotFound => Err(DomainError::new(
                ErrorCode::HandlerNotFound,
                format!(
                    "No {} handler configured for the {} event {}",
                    K::ACTION,
                    K::NAME,
                    record.event_name
                ),
            )
            .with_detail("provider", record.provider.as_str())),
        }
    }

    async fn dispatch(&self, record: &EventRecord) -> DispatchOutcome {
        let handler = match self.route(record) {
            Ok(handler) => handler,
            Err(e) if e.code == ErrorCode::ProviderMismatch => {
                tracing::error!(
                    event_id = %record.id,
                    event_name = %record.event_name,
                    provider = %record.provider,
                    code = %e.code,
                    "{}",
                    e.message
                );
                return DispatchOutcome::Unroutable;
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %record.id,
                    event_name = %record.event_name,
                    provider = %record.provider,
                    code = %e.code,
                    "{}",
                    e.message
                );
                return DispatchOutcome::Unroutable;
            }
        };

        tracing::trace!(
            event_id = %record.id,
            event_name = %record.event_name,
            provider = %record.provider,
            handler = handler.handler_name(),
            "Executing {} event",
            K::NAME
        );

        match self.invoke(handler, record).await {
            Ok(true) => DispatchOutcome::Processed,
            Ok(false) => {
                tracing::debug!(
                    event_id = %record.id,
                    event_name = %record.event_name,
                    try_count = record.try_count + 1,
                    "Handler asked to retry {} event",
                    K::NAME
                );
                DispatchOutcome::Retry
            }
            Err(e) => {
                tracing::error!(
                    event_id = %record.id,
                    event_name = %record.event_name,
                    provider = %record.provider,
                    error = %e,
                    "Error while trying to {} the {} event",
                    K::ACTION,
                    K::NAME
                );
                DispatchOutcome::Failed
            }
        }
    }

    async fn invoke(
        &self,
        handler: &RegisteredHandler,
        record: &EventRecord,
    ) -> Result<bool, DomainError> {
        let call = AssertUnwindSafe(handler.dispatch(record)).catch_unwind();

        let result = match self.config.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                DomainError::new(
                    ErrorCode::HandlerTimeout,
                    format!("Handler did not finish within {:?}", limit),
                )
            })?,
            None => call.await,
        };

        result.map_err(|_| DomainError::new(ErrorCode::HandlerFailed, "Handler panicked"))?
    }
}
