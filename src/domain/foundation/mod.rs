//! Foundation module - Shared domain primitives.
//!
//! Contains the error types that form the vocabulary of the event storage
//! domain.

mod errors;

pub use errors::{DomainError, ErrorCode};
