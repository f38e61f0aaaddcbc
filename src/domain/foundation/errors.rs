//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,

    // Resolution errors
    HandlerNotFound,
    ProviderMismatch,

    // Dispatch errors
    HandlerFailed,
    HandlerTimeout,

    // Infrastructure errors
    SerializationError,
    DatabaseError,
    ConfigurationError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorCode::ProviderMismatch => "PROVIDER_MISMATCH",
            ErrorCode::HandlerFailed => "HANDLER_FAILED",
            ErrorCode::HandlerTimeout => "HANDLER_TIMEOUT",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a database error for the given table.
    pub fn database(table: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message).with_detail("table", table)
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Creates an error raised by an event publisher or receiver.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerFailed, message)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::HandlerNotFound, "No publisher for UserCreated");
        assert_eq!(
            format!("{}", err),
            "[HANDLER_NOT_FOUND] No publisher for UserCreated"
        );
    }

    #[test]
    fn domain_error_with_detail_adds_detail() {
        let err = DomainError::new(ErrorCode::ValidationFailed, "Validation failed")
            .with_detail("field", "table_name")
            .with_detail("reason", "empty");

        assert_eq!(err.details.get("field"), Some(&"table_name".to_string()));
        assert_eq!(err.details.get("reason"), Some(&"empty".to_string()));
    }

    #[test]
    fn database_error_records_table() {
        let err = DomainError::database("Outbox", "connection refused");
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.details.get("table"), Some(&"Outbox".to_string()));
    }

    #[test]
    fn serde_errors_convert_to_serialization_errors() {
        let err: DomainError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::SerializationError);
    }

    #[test]
    fn error_code_display_all_variants() {
        let codes = vec![
            (ErrorCode::ValidationFailed, "VALIDATION_FAILED"),
            (ErrorCode::HandlerNotFound, "HANDLER_NOT_FOUND"),
            (ErrorCode::ProviderMismatch, "PROVIDER_MISMATCH"),
            (ErrorCode::HandlerFailed, "HANDLER_FAILED"),
            (ErrorCode::HandlerTimeout, "HANDLER_TIMEOUT"),
            (ErrorCode::SerializationError, "SERIALIZATION_ERROR"),
            (ErrorCode::DatabaseError, "DATABASE_ERROR"),
            (ErrorCode::ConfigurationError, "CONFIGURATION_ERROR"),
        ];

        for (code, expected) in codes {
            assert_eq!(format!("{}", code), expected);
        }
    }
}
