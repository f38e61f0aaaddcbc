//! Event Storage - Transactional Inbox and Outbox
//!
//! Events are written to an outbox (or inbox) table in the same database
//! transaction as the business change, then delivered (or handled) by a
//! background poll loop with bounded concurrency, retry backoff and periodic
//! cleanup of processed records. Delivery is at-least-once; handlers must be
//! idempotent.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
