//! Background services - Long-running loops owned by the host.
//!
//! - `EventsProcessorService` - Poll cycles of one inbox or outbox table
//! - `CleanupService` - Deletion of old processed events

mod cleanup;
mod processor;

pub use cleanup::CleanupService;
pub use processor::EventsProcessorService;
