//! Domain layer containing event storage types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (errors)
//! - `event_box` - Inbox/outbox records, providers and typed events

pub mod event_box;
pub mod foundation;
