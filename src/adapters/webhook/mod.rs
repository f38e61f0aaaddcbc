//! Webhook adapters - HTTP delivery of outbox events.
//!
//! - `WebhookEventPublisher` - Global publisher for the `WebHook` provider

mod publisher;

pub use publisher::{WebhookConfig, WebhookEventPublisher};
