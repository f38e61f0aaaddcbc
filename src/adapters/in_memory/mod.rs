//! In-memory adapters.
//!
//! - `InMemoryEventRepository` - Event table kept in process memory

mod event_repository;

pub use event_repository::InMemoryEventRepository;
