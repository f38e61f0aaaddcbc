//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the event storage to external systems:
//! - `postgres` - Inbox/outbox tables in PostgreSQL
//! - `in_memory` - Inbox/outbox tables in process memory (tests, embedding)
//! - `webhook` - HTTP delivery for the `WebHook` provider
//! - `background` - Poll and cleanup loops run by the host

pub mod background;
pub mod in_memory;
pub mod postgres;
pub mod webhook;

pub use background::{CleanupService, EventsProcessorService};
pub use in_memory::InMemoryEventRepository;
pub use postgres::PostgresEventRepository;
pub use webhook::{WebhookConfig, WebhookEventPublisher};
