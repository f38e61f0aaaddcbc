//! Handler ports - Interfaces implemented by the host to deliver and consume events.
//!
//! Handlers return `Ok(true)` when the event was handled, `Ok(false)` when it
//! should be retried on a later cycle, and `Err` on failure. Errors count
//! toward the retry backoff; `Ok(false)` only counts the attempt.
//!
//! Handlers must be idempotent: delivery is at-least-once.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::event_box::{AdditionalData, Headers, ReceiveEvent, SendEvent};
use crate::domain::foundation::DomainError;

/// Publishes outbox events of type `E` through one provider.
///
/// # Example
///
/// ```ignore
/// struct UserCreatedPublisher { channel: BrokerChannel }
///
/// #[async_trait]
/// impl EventPublisher<UserCreated> for UserCreatedPublisher {
///     async fn publish(&self, event: UserCreated, event_path: &str) -> Result<bool, DomainError> {
///         self.channel.publish(event_path, serde_json::to_vec(&event)?).await?;
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait EventPublisher<E: SendEvent>: Send + Sync + 'static {
    /// Publish `event` to the transport address `event_path`.
    async fn publish(&self, event: E, event_path: &str) -> Result<bool, DomainError>;
}

/// Handles inbox events of type `E` received through one provider.
#[async_trait]
pub trait EventReceiver<E: ReceiveEvent>: Send + Sync + 'static {
    /// Handle `event`, which arrived at the transport address `event_path`.
    async fn receive(&self, event: E, event_path: &str) -> Result<bool, DomainError>;
}

/// An event as seen by global handlers: untyped JSON plus decoded metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub id: Uuid,
    pub event_name: String,
    pub event_path: String,
    pub payload: serde_json::Value,
    pub headers: Option<Headers>,
    pub additional_data: Option<AdditionalData>,
}

/// Publishes every outbox event of one provider that has no typed publisher.
#[async_trait]
pub trait GlobalEventPublisher: Send + Sync + 'static {
    async fn publish(&self, event: RawEvent) -> Result<bool, DomainError>;
}

/// Handles every inbox event of one provider that has no typed receiver.
#[async_trait]
pub trait GlobalEventReceiver: Send + Sync + 'static {
    async fn receive(&self, event: RawEvent) -> Result<bool, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that global handlers are object-safe
    #[allow(dead_code)]
    fn assert_publisher_object_safe(_: &dyn GlobalEventPublisher) {}

    #[allow(dead_code)]
    fn assert_receiver_object_safe(_: &dyn GlobalEventReceiver) {}
}
