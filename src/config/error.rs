//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid event table name: {0:?}")]
    InvalidTableName(String),

    #[error("Inbox and Outbox cannot share the table {0:?}")]
    DuplicateTableName(String),

    #[error("max_concurrency must be greater than zero")]
    InvalidConcurrency,

    #[error("batch_size must be greater than zero")]
    InvalidBatchSize,

    #[error("seconds_to_delay_processing must be greater than zero")]
    InvalidPollDelay,

    #[error("hours_to_delay_clean_up must be greater than zero")]
    InvalidCleanupInterval,

    #[error("days_to_clean_up_events must not exceed {max}, got {got}")]
    InvalidRetention { got: u32, max: u32 },

    #[error("handler_timeout_secs must be greater than zero when set")]
    InvalidHandlerTimeout,

    #[error("Unknown log level: {0}")]
    InvalidLogLevel(String),
}
