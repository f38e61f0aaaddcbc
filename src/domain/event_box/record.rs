//! EventRecord - one row of the inbox or outbox table.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::event::{AdditionalData, BoxedEvent, Headers};
use super::provider::EventProvider;
use crate::domain::foundation::DomainError;

/// Current time at the precision Postgres stores (microseconds).
pub fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Serialize an event body to JSON, leaving out fields whose value is null.
pub fn serialize_payload<T: Serialize>(value: &T) -> Result<String, DomainError> {
    let mut value = serde_json::to_value(value)?;
    strip_nulls(&mut value);
    Ok(serde_json::to_string(&value)?)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, field| !field.is_null());
            fields.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// A stored event together with its processing state.
///
/// Only the dispatch manager mutates `try_count`, `try_after_at` and
/// `processed_at`, and only through [`processed`](Self::processed),
/// [`increase_try_count`](Self::increase_try_count) and
/// [`failed`](Self::failed).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Producer-assigned id; primary key of the table.
    pub id: Uuid,

    /// Provider name as stored (see [`EventProvider::as_str`]).
    pub provider: String,

    /// Logical event name used to resolve a handler.
    pub event_name: String,

    /// Transport-specific address (routing key, URL, ...).
    pub event_path: String,

    /// Serialized event body without headers and additional data.
    pub payload: String,

    /// Serialized header map, if the event had any headers.
    pub headers: Option<String>,

    /// Serialized additional data map, if the event had any.
    pub additional_data: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Dispatch attempts so far.
    pub try_count: i32,

    /// Earliest time of the next attempt.
    pub try_after_at: DateTime<Utc>,

    /// Set once, when dispatch succeeded.
    pub processed_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Create a new unprocessed record.
    pub fn new(
        id: Uuid,
        provider: EventProvider,
        event_name: impl Into<String>,
        event_path: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let created_at = db_now();
        Self {
            id,
            provider: provider.as_str().to_string(),
            event_name: event_name.into(),
            event_path: event_path.into(),
            payload: payload.into(),
            headers: None,
            additional_data: None,
            created_at,
            try_count: 0,
            try_after_at: created_at,
            processed_at: None,
        }
    }

    /// Attach already serialized headers. Empty strings are stored as NULL.
    pub fn with_headers(mut self, headers: Option<String>) -> Self {
        self.headers = headers.filter(|h| !h.is_empty());
        self
    }

    /// Attach already serialized additional data. Empty strings are stored as NULL.
    pub fn with_additional_data(mut self, additional_data: Option<String>) -> Self {
        self.additional_data = additional_data.filter(|d| !d.is_empty());
        self
    }

    /// Serialize a typed event into a record.
    ///
    /// Headers and additional data are taken out of the event before the
    /// payload is serialized; empty maps are stored as NULL.
    pub fn from_event<E: BoxedEvent>(
        mut event: E,
        provider: EventProvider,
        event_path: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let headers = match event.take_headers() {
            Some(headers) if !headers.is_empty() => Some(serde_json::to_string(&headers)?),
            _ => None,
        };
        let additional_data = match event.take_additional_data() {
            Some(data) if !data.is_empty() => Some(serde_json::to_string(&data)?),
            _ => None,
        };
        let payload = serialize_payload(&event)?;

        Ok(Self::new(event.event_id(), provider, E::EVENT_NAME, event_path, payload)
            .with_headers(headers)
            .with_additional_data(additional_data))
    }

    /// Reconstruct the typed event, merging headers and additional data back.
    pub fn to_event<E: BoxedEvent>(&self) -> Result<E, DomainError> {
        let mut event: E = serde_json::from_str(&self.payload)?;
        if E::HAS_HEADERS {
            if let Some(headers) = self.decode_headers()? {
                event.set_headers(headers);
            }
        }
        if E::HAS_ADDITIONAL_DATA {
            if let Some(data) = self.decode_additional_data()? {
                event.set_additional_data(data);
            }
        }
        Ok(event)
    }

    pub fn decode_headers(&self) -> Result<Option<Headers>, DomainError> {
        self.headers
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(DomainError::from)
    }

    pub fn decode_additional_data(&self) -> Result<Option<AdditionalData>, DomainError> {
        self.additional_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(DomainError::from)
    }

    /// Parsed provider, or `None` when the stored name is not recognized.
    pub fn provider(&self) -> Option<EventProvider> {
        self.provider.parse().ok()
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Whether the record may be dispatched at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.processed_at.is_none() && self.try_after_at <= now
    }

    /// Mark the record as successfully dispatched.
    ///
    /// Counts the attempt. `processed_at` is set only the first time.
    pub fn processed(&mut self) {
        self.increase_try_count();
        if self.processed_at.is_none() {
            self.processed_at = Some(db_now());
        }
    }

    /// Count an attempt without changing when the next one may run.
    pub fn increase_try_count(&mut self) {
        self.try_count = self.try_count.saturating_add(1);
    }

    /// Count a failed attempt; past `max_try_count` attempts, postpone the
    /// next one by `try_after_minutes`.
    pub fn failed(&mut self, max_try_count: u32, try_after_minutes: u32) {
        self.increase_try_count();
        let max_try_count = i32::try_from(max_try_count).unwrap_or(i32::MAX);
        if self.try_count > max_try_count {
            self.try_after_at = db_now() + Duration::minutes(i64::from(try_after_minutes));
        }
    }
}
