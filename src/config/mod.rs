//! Application configuration module
//!
//! Configuration is loaded from environment variables using the `config` and
//! `dotenvy` crates. Variables carry the `EVENT_STORAGE` prefix and nested
//! values are separated by a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use event_storage::config::{AppConfig, EventBoxOverrides};
//!
//! let config = AppConfig::load()
//!     .expect("Failed to load configuration")
//!     .with_overrides(
//!         EventBoxOverrides::default(),
//!         EventBoxOverrides { max_concurrency: Some(4), ..Default::default() },
//!     );
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod event_box;
mod logging;

pub use database::{is_postgres_url, DatabaseConfig};
pub use error::{ConfigError, ValidationError};
pub use event_box::{is_valid_table_name, EventBoxConfig, EventBoxOverrides, MAX_RETENTION_DAYS};
pub use logging::LoggingConfig;

use serde::Deserialize;

/// Root configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL pools)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Inbox table and its background services
    #[serde(default = "EventBoxConfig::inbox")]
    pub inbox: EventBoxConfig,

    /// Outbox table and its background services
    #[serde(default = "EventBoxConfig::outbox")]
    pub outbox: EventBoxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            inbox: EventBoxConfig::inbox(),
            outbox: EventBoxConfig::outbox(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `EVENT_STORAGE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Fills missing table names with "Inbox" and "Outbox"
    ///
    /// # Environment Variable Format
    ///
    /// - `EVENT_STORAGE__DATABASE__URL=...` -> `database.url = ...`
    /// - `EVENT_STORAGE__OUTBOX__MAX_CONCURRENCY=4` -> `outbox.max_concurrency = 4`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let mut config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("EVENT_STORAGE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        if config.inbox.table_name.is_empty() {
            config.inbox.table_name = EventBoxConfig::inbox().table_name;
        }
        if config.outbox.table_name.is_empty() {
            config.outbox.table_name = EventBoxConfig::outbox().table_name;
        }

        Ok(config)
    }

    /// Apply explicit overrides to the inbox and outbox settings
    pub fn with_overrides(mut self, inbox: EventBoxOverrides, outbox: EventBoxOverrides) -> Self {
        self.inbox = self.inbox.merge(inbox);
        self.outbox = self.outbox.merge(outbox);
        self
    }

    /// Connection URL used by `event_box`: its own, else `database.url`
    pub fn connection_url<'a>(&'a self, event_box: &'a EventBoxConfig) -> Option<&'a str> {
        event_box
            .connection_string
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| Some(self.database.url.as_str()).filter(|url| !url.is_empty()))
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.logging.validate()?;

        for event_box in [&self.inbox, &self.outbox] {
            event_box.validate()?;
            if !event_box.is_enabled {
                continue;
            }
            match self.connection_url(event_box) {
                None => return Err(ValidationError::MissingRequired("DATABASE_URL")),
                Some(url) if !is_postgres_url(url) => {
                    return Err(ValidationError::InvalidDatabaseUrl)
                }
                Some(_) => {}
            }
        }

        if self.inbox.is_enabled
            && self.outbox.is_enabled
            && self.inbox.table_name == self.outbox.table_name
        {
            return Err(ValidationError::DuplicateTableName(
                self.inbox.table_name.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "EVENT_STORAGE__DATABASE__URL",
        "EVENT_STORAGE__OUTBOX__MAX_CONCURRENCY",
        "EVENT_STORAGE__OUTBOX__HANDLER_TIMEOUT_SECS",
        "EVENT_STORAGE__INBOX__IS_ENABLED",
        "EVENT_STORAGE__INBOX__TABLE_NAME",
        "EVENT_STORAGE__LOGGING__JSON",
    ];

    fn set_minimal_env() {
        env::set_var("EVENT_STORAGE__DATABASE__URL", "postgresql://test@localhost/test");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/events".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.inbox, EventBoxConfig::inbox());
        assert_eq!(config.outbox, EventBoxConfig::outbox());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("EVENT_STORAGE__OUTBOX__MAX_CONCURRENCY", "4");
        env::set_var("EVENT_STORAGE__OUTBOX__HANDLER_TIMEOUT_SECS", "15");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.outbox.max_concurrency, 4);
        assert_eq!(config.outbox.handler_timeout_secs, Some(15));
        assert_eq!(config.outbox.table_name, "Outbox");
        assert_eq!(config.outbox.batch_size, 1000);
    }

    #[test]
    fn test_inbox_section_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("EVENT_STORAGE__INBOX__IS_ENABLED", "false");
        env::set_var("EVENT_STORAGE__INBOX__TABLE_NAME", "ReceivedEvents");
        env::set_var("EVENT_STORAGE__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(!config.inbox.is_enabled);
        assert_eq!(config.inbox.table_name, "ReceivedEvents");
        assert!(config.logging.json);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = valid_config().with_overrides(
            EventBoxOverrides {
                is_enabled: Some(false),
                ..Default::default()
            },
            EventBoxOverrides {
                try_count: Some(3),
                ..Default::default()
            },
        );

        assert!(!config.inbox.is_enabled);
        assert_eq!(config.outbox.try_count, 3);
        assert_eq!(config.outbox.max_concurrency, 10);
    }

    #[test]
    fn test_connection_url_falls_back_to_database_url() {
        let mut config = valid_config();
        config.outbox.connection_string = Some("postgres://other/outbox".to_string());

        assert_eq!(config.connection_url(&config.outbox), Some("postgres://other/outbox"));
        assert_eq!(config.connection_url(&config.inbox), Some("postgres://localhost/events"));
    }

    #[test]
    fn test_enabled_box_requires_connection_url() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired(_))
        ));

        let mut disabled = AppConfig::default();
        disabled.inbox.is_enabled = false;
        disabled.outbox.is_enabled = false;
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_tables_must_differ() {
        let mut config = valid_config();
        config.inbox.table_name = "Events".to_string();
        config.outbox.table_name = "Events".to_string();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateTableName(_))
        ));

        config.inbox.is_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_table_name_is_rejected() {
        let config = valid_config().with_overrides(
            EventBoxOverrides::default(),
            EventBoxOverrides {
                table_name: Some("outbox; DROP".to_string()),
                ..Default::default()
            },
        );

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidTableName(_))
        ));
    }
}
