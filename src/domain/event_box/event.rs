//! Typed events stored in the inbox and outbox.
//!
//! An event is any serde type with a stable name and an id. Events may
//! additionally carry headers and additional data; those maps are stored in
//! their own columns and are stripped from the serialized payload.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//! use event_storage::domain::event_box::{BoxedEvent, Headers, SendEvent};
//!
//! #[derive(Serialize, Deserialize)]
//! struct UserCreated {
//!     id: Uuid,
//!     name: String,
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     headers: Option<Headers>,
//! }
//!
//! impl BoxedEvent for UserCreated {
//!     const EVENT_NAME: &'static str = "UserCreated";
//!     const HAS_HEADERS: bool = true;
//!
//!     fn event_id(&self) -> Uuid {
//!         self.id
//!     }
//!
//!     fn take_headers(&mut self) -> Option<Headers> {
//!         self.headers.take()
//!     }
//!
//!     fn set_headers(&mut self, headers: Headers) {
//!         self.headers = Some(headers);
//!     }
//! }
//!
//! impl SendEvent for UserCreated {}
//! ```

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Header map of an event.
pub type Headers = HashMap<String, serde_json::Value>;

/// Secondary metadata of an event.
pub type AdditionalData = HashMap<String, String>;

/// Common contract of every event stored in an event table.
///
/// Types that carry headers or additional data set the matching capability
/// constant and override the take/set pair for that map. The maps must be
/// declared with `skip_serializing_if = "Option::is_none"` so that a taken map
/// does not leave a `null` in the payload.
pub trait BoxedEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Logical event name used to resolve handlers.
    const EVENT_NAME: &'static str;

    /// Whether the event carries headers.
    const HAS_HEADERS: bool = false;

    /// Whether the event carries additional data.
    const HAS_ADDITIONAL_DATA: bool = false;

    /// Producer-assigned id, used as the idempotency key.
    fn event_id(&self) -> Uuid;

    fn take_headers(&mut self) -> Option<Headers> {
        None
    }

    fn set_headers(&mut self, _headers: Headers) {}

    fn take_additional_data(&mut self) -> Option<AdditionalData> {
        None
    }

    fn set_additional_data(&mut self, _additional_data: AdditionalData) {}
}

/// Event written to the outbox for delivery.
pub trait SendEvent: BoxedEvent {}

/// Event written to the inbox after it was received.
pub trait ReceiveEvent: BoxedEvent {}

/// Capability flags of a registered event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCapabilities {
    pub has_headers: bool,
    pub has_additional_data: bool,
}

impl EventCapabilities {
    /// Capabilities declared by `E`.
    pub fn of<E: BoxedEvent>() -> Self {
        Self {
            has_headers: E::HAS_HEADERS,
            has_additional_data: E::HAS_ADDITIONAL_DATA,
        }
    }

    /// Capabilities assumed for global handlers, which see every map.
    pub fn all() -> Self {
        Self {
            has_headers: true,
            has_additional_data: true,
        }
    }
}
