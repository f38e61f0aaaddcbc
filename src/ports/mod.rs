//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the event storage core and the outside world. Adapters implement these
//! ports; handlers are implemented by the host application.
//!
//! ## Storage Ports
//!
//! - `EventRepository` - One inbox or outbox table
//!
//! ## Handler Ports
//!
//! - `EventPublisher` - Typed delivery of outbox events through a provider
//! - `EventReceiver` - Typed handling of inbox events from a provider
//! - `GlobalEventPublisher` / `GlobalEventReceiver` - Per-provider fallbacks

mod event_handlers;
mod event_repository;

pub use event_handlers::{
    EventPublisher, EventReceiver, GlobalEventPublisher, GlobalEventReceiver, RawEvent,
};
pub use event_repository::EventRepository;
