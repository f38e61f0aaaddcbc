//! Inbox/Outbox configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Longest accepted table name; index names append a suffix to it and
/// PostgreSQL truncates identifiers at 63 bytes.
const MAX_TABLE_NAME_LEN: usize = 47;

/// Longest accepted retention window, in days.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Whether `name` can be used as an event table name.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_TABLE_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Settings of one event table (inbox or outbox) and its background services.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventBoxConfig {
    /// Store and process events of this direction
    #[serde(default = "default_is_enabled")]
    pub is_enabled: bool,

    /// Table name; filled with "Inbox"/"Outbox" when not configured
    #[serde(default)]
    pub table_name: String,

    /// Maximum dispatches in flight per poll cycle
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Maximum records fetched per poll cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Failed attempts after which the retry delay applies
    #[serde(default = "default_try_count")]
    pub try_count: u32,

    /// Retry delay in minutes once `try_count` is exceeded
    #[serde(default = "default_try_after_minutes")]
    pub try_after_minutes: u32,

    /// Delay between poll cycles in seconds
    #[serde(default = "default_seconds_to_delay_processing")]
    pub seconds_to_delay_processing: u64,

    /// Processed events older than this many days are deleted
    #[serde(default = "default_days_to_clean_up_events")]
    pub days_to_clean_up_events: u32,

    /// Delay between cleanup runs in hours
    #[serde(default = "default_hours_to_delay_clean_up")]
    pub hours_to_delay_clean_up: u32,

    /// Connection string for this table; falls back to `database.url`
    pub connection_string: Option<String>,

    /// Deadline for one handler invocation in seconds; unbounded when unset
    pub handler_timeout_secs: Option<u64>,
}

/// Explicit overrides layered on top of loaded configuration.
///
/// Every `Some` field replaces the loaded value; `None` keeps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBoxOverrides {
    pub is_enabled: Option<bool>,
    pub table_name: Option<String>,
    pub max_concurrency: Option<u32>,
    pub batch_size: Option<u32>,
    pub try_count: Option<u32>,
    pub try_after_minutes: Option<u32>,
    pub seconds_to_delay_processing: Option<u64>,
    pub days_to_clean_up_events: Option<u32>,
    pub hours_to_delay_clean_up: Option<u32>,
    pub connection_string: Option<String>,
    pub handler_timeout_secs: Option<u64>,
}

impl EventBoxConfig {
    /// Defaults for the inbox table.
    pub fn inbox() -> Self {
        Self::named("Inbox")
    }

    /// Defaults for the outbox table.
    pub fn outbox() -> Self {
        Self::named("Outbox")
    }

    fn named(table_name: &str) -> Self {
        Self {
            is_enabled: default_is_enabled(),
            table_name: table_name.to_string(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            try_count: default_try_count(),
            try_after_minutes: default_try_after_minutes(),
            seconds_to_delay_processing: default_seconds_to_delay_processing(),
            days_to_clean_up_events: default_days_to_clean_up_events(),
            hours_to_delay_clean_up: default_hours_to_delay_clean_up(),
            connection_string: None,
            handler_timeout_secs: None,
        }
    }

    /// Apply explicit overrides field by field.
    pub fn merge(mut self, overrides: EventBoxOverrides) -> Self {
        if let Some(v) = overrides.is_enabled {
            self.is_enabled = v;
        }
        if let Some(v) = overrides.table_name {
            self.table_name = v;
        }
        if let Some(v) = overrides.max_concurrency {
            self.max_concurrency = v;
        }
        if let Some(v) = overrides.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = overrides.try_count {
            self.try_count = v;
        }
        if let Some(v) = overrides.try_after_minutes {
            self.try_after_minutes = v;
        }
        if let Some(v) = overrides.seconds_to_delay_processing {
            self.seconds_to_delay_processing = v;
        }
        if let Some(v) = overrides.days_to_clean_up_events {
            self.days_to_clean_up_events = v;
        }
        if let Some(v) = overrides.hours_to_delay_clean_up {
            self.hours_to_delay_clean_up = v;
        }
        if overrides.connection_string.is_some() {
            self.connection_string = overrides.connection_string;
        }
        if overrides.handler_timeout_secs.is_some() {
            self.handler_timeout_secs = overrides.handler_timeout_secs;
        }
        self
    }

    /// Get poll delay as Duration
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.seconds_to_delay_processing)
    }

    /// Get cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.hours_to_delay_clean_up) * 3600)
    }

    /// Get retention window of processed events
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.days_to_clean_up_events))
    }

    /// Get handler deadline as Duration
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }

    /// Validate settings of an enabled table
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.is_enabled {
            return Ok(());
        }
        if !is_valid_table_name(&self.table_name) {
            return Err(ValidationError::InvalidTableName(self.table_name.clone()));
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.seconds_to_delay_processing == 0 {
            return Err(ValidationError::InvalidPollDelay);
        }
        if self.hours_to_delay_clean_up == 0 {
            return Err(ValidationError::InvalidCleanupInterval);
        }
        if self.days_to_clean_up_events > MAX_RETENTION_DAYS {
            return Err(ValidationError::InvalidRetention {
                got: self.days_to_clean_up_events,
                max: MAX_RETENTION_DAYS,
            });
        }
        if self.handler_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidHandlerTimeout);
        }
        Ok(())
    }
}

fn default_is_enabled() -> bool {
    true
}

fn default_max_concurrency() -> u32 {
    10
}

fn default_batch_size() -> u32 {
    1000
}

fn default_try_count() -> u32 {
    10
}

fn default_try_after_minutes() -> u32 {
    5
}

fn default_seconds_to_delay_processing() -> u64 {
    1
}

fn default_days_to_clean_up_events() -> u32 {
    30
}

fn default_hours_to_delay_clean_up() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EventBoxConfig::outbox();
        assert!(config.is_enabled);
        assert_eq!(config.table_name, "Outbox");
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.try_count, 10);
        assert_eq!(config.try_after_minutes, 5);
        assert_eq!(config.poll_delay(), Duration::from_secs(1));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
        assert_eq!(config.retention(), chrono::Duration::days(30));
        assert_eq!(config.handler_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_overwrites_only_given_fields() {
        let merged = EventBoxConfig::inbox().merge(EventBoxOverrides {
            max_concurrency: Some(3),
            table_name: Some("ReceivedEvents".to_string()),
            handler_timeout_secs: Some(30),
            ..Default::default()
        });

        assert_eq!(merged.max_concurrency, 3);
        assert_eq!(merged.table_name, "ReceivedEvents");
        assert_eq!(merged.handler_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(merged.try_count, 10);
        assert_eq!(merged.batch_size, 1000);
        assert!(merged.is_enabled);
    }

    #[test]
    fn test_empty_merge_is_identity() {
        let config = EventBoxConfig::outbox();
        assert_eq!(config.clone().merge(EventBoxOverrides::default()), config);
    }

    #[test]
    fn test_table_name_rules() {
        assert!(is_valid_table_name("Outbox"));
        assert!(is_valid_table_name("_events_2024"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2events"));
        assert!(!is_valid_table_name("out box"));
        assert!(!is_valid_table_name("outbox\"; --"));
        assert!(!is_valid_table_name(&"a".repeat(48)));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let zero_concurrency = EventBoxConfig {
            max_concurrency: 0,
            ..EventBoxConfig::outbox()
        };
        assert!(matches!(
            zero_concurrency.validate(),
            Err(ValidationError::InvalidConcurrency)
        ));

        let zero_delay = EventBoxConfig {
            seconds_to_delay_processing: 0,
            ..EventBoxConfig::outbox()
        };
        assert!(matches!(zero_delay.validate(), Err(ValidationError::InvalidPollDelay)));
    }

    #[test]
    fn test_retention_beyond_limit_is_rejected() {
        let at_limit = EventBoxConfig::outbox().merge(EventBoxOverrides {
            days_to_clean_up_events: Some(MAX_RETENTION_DAYS),
            ..Default::default()
        });
        assert!(at_limit.validate().is_ok());

        let too_long = EventBoxConfig::outbox().merge(EventBoxOverrides {
            days_to_clean_up_events: Some(200_000_000),
            ..Default::default()
        });
        assert!(matches!(
            too_long.validate(),
            Err(ValidationError::InvalidRetention { got: 200_000_000, .. })
        ));
    }

    #[test]
    fn test_disabled_box_skips_validation() {
        let config = EventBoxConfig {
            is_enabled: false,
            table_name: String::new(),
            ..EventBoxConfig::inbox()
        };
        assert!(config.validate().is_ok());
    }
}
