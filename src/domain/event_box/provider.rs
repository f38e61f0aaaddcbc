//! Transport providers an event can be delivered through or received from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode};

/// Provider of an event.
///
/// Persisted in the `provider` column by its canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventProvider {
    MessageBroker,
    Sms,
    WebHook,
    Email,
    #[serde(rename = "gRPC")]
    Grpc,
    Unknown,
}

impl EventProvider {
    /// All known providers.
    pub const ALL: [EventProvider; 6] = [
        EventProvider::MessageBroker,
        EventProvider::Sms,
        EventProvider::WebHook,
        EventProvider::Email,
        EventProvider::Grpc,
        EventProvider::Unknown,
    ];

    /// Canonical name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventProvider::MessageBroker => "MessageBroker",
            EventProvider::Sms => "Sms",
            EventProvider::WebHook => "WebHook",
            EventProvider::Email => "Email",
            EventProvider::Grpc => "gRPC",
            EventProvider::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EventProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventProvider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::ValidationFailed, format!("Unknown event provider: {}", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_parse_back() {
        for provider in EventProvider::ALL {
            assert_eq!(provider.as_str().parse::<EventProvider>().unwrap(), provider);
        }
    }

    #[test]
    fn grpc_uses_original_casing() {
        assert_eq!(EventProvider::Grpc.to_string(), "gRPC");
        assert_eq!(serde_json::to_string(&EventProvider::Grpc).unwrap(), "\"gRPC\"");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "RabbitMQ".parse::<EventProvider>().unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
