//! Event box - the durable inbox/outbox record and the typed events stored in it.

mod event;
mod kind;
mod provider;
mod record;

pub use event::{AdditionalData, BoxedEvent, EventCapabilities, Headers, ReceiveEvent, SendEvent};
pub use kind::{EventBoxKind, Inbox, Outbox};
pub use provider::EventProvider;
pub use record::{db_now, serialize_payload, EventRecord};
