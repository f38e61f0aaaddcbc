//! ProviderRegistry - maps `(event_name, provider)` to a handler.
//!
//! The registry is assembled once through [`ProviderRegistryBuilder`] and is
//! immutable afterwards, so the dispatch manager can share it between
//! concurrent dispatches without locking.
//!
//! Lookup order for a record:
//! 1. The typed handler registered for its event name and provider
//! 2. The global handler of its provider
//! 3. A typed handler for its event name under another provider (mismatch)

use std::any::type_name;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::event_box::{
    EventBoxKind, EventCapabilities, EventProvider, EventRecord, Inbox, Outbox, ReceiveEvent,
    SendEvent,
};
use crate::domain::foundation::DomainError;
use crate::ports::{
    EventPublisher, EventReceiver, GlobalEventPublisher, GlobalEventReceiver, RawEvent,
};

/// Type-erased handler invocation for one stored record.
#[async_trait]
trait RecordDispatcher: Send + Sync {
    async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError>;
}

/// A handler known to the registry.
#[derive(Clone)]
pub struct RegisteredHandler {
    dispatcher: Arc<dyn RecordDispatcher>,
    capabilities: EventCapabilities,
    handler_name: &'static str,
}

impl RegisteredHandler {
    fn new<D: RecordDispatcher + 'static>(
        dispatcher: D,
        capabilities: EventCapabilities,
        handler_name: &'static str,
    ) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            capabilities,
            handler_name,
        }
    }

    /// Which metadata maps the handler's event type carries.
    pub fn capabilities(&self) -> EventCapabilities {
        self.capabilities
    }

    /// Rust type name of the handler, for logs.
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Rebuild the event from `record` and hand it to the handler.
    pub async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError> {
        self.dispatcher.dispatch(record).await
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("handler_name", &self.handler_name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Result of looking up the handler for a record.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// Typed handler for the event name and provider.
    Typed(&'a RegisteredHandler),
    /// Global handler of the provider.
    Global(&'a RegisteredHandler),
    /// The event name is only handled under other providers.
    ProviderMismatch { configured: Vec<EventProvider> },
    NotFound,
}

/// Immutable lookup table of handlers for one direction.
pub struct ProviderRegistry<K: EventBoxKind> {
    typed: HashMap<(String, EventProvider), RegisteredHandler>,
    global: HashMap<EventProvider, RegisteredHandler>,
    _kind: PhantomData<K>,
}

impl<K: EventBoxKind> ProviderRegistry<K> {
    /// Start assembling a registry.
    pub fn builder() -> ProviderRegistryBuilder<K> {
        ProviderRegistryBuilder::new()
    }

    /// Find the handler for a record of `event_name` stored with `provider`.
    ///
    /// `provider` is `None` when the stored provider name is not recognized;
    /// such records can only end up as a mismatch or not found.
    pub fn resolve(&self, event_name: &str, provider: Option<EventProvider>) -> Resolution<'_> {
        if let Some(provider) = provider {
            if let Some(handler) = self.typed.get(&(event_name.to_string(), provider)) {
                return Resolution::Typed(handler);
            }
            if let Some(handler) = self.global.get(&provider) {
                return Resolution::Global(handler);
            }
        }

        let mut configured: Vec<EventProvider> = self
            .typed
            .keys()
            .filter(|(name, _)| name == event_name)
            .map(|(_, provider)| *provider)
            .collect();

        if configured.is_empty() {
            return Resolution::NotFound;
        }
        configured.sort_by_key(|p| p.as_str());
        Resolution::ProviderMismatch { configured }
    }

    /// Number of typed handlers.
    pub fn len(&self) -> usize {
        self.typed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.global.is_empty()
    }

    /// Whether a global handler is registered for `provider`.
    pub fn has_global(&self, provider: EventProvider) -> bool {
        self.global.contains_key(&provider)
    }
}

impl<K: EventBoxKind> std::fmt::Debug for ProviderRegistry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kind", &K::NAME)
            .field("typed", &self.typed.keys().collect::<Vec<_>>())
            .field("global", &self.global.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects handler registrations before the registry is frozen.
///
/// Only the methods of the matching direction exist: publishers on
/// `ProviderRegistryBuilder<Outbox>`, receivers on `ProviderRegistryBuilder<Inbox>`.
///
/// # Example
///
/// ```ignore
/// let registry = ProviderRegistry::<Outbox>::builder()
///     .add_publisher(EventProvider::MessageBroker, UserCreatedPublisher::new(channel))
///     .add_global_publisher(EventProvider::WebHook, WebhookEventPublisher::new()?)
///     .build();
/// ```
pub struct ProviderRegistryBuilder<K: EventBoxKind> {
    typed: HashMap<(String, EventProvider), RegisteredHandler>,
    global: HashMap<EventProvider, RegisteredHandler>,
    _kind: PhantomData<K>,
}

impl<K: EventBoxKind> Default for ProviderRegistryBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EventBoxKind> ProviderRegistryBuilder<K> {
    pub fn new() -> Self {
        Self {
            typed: HashMap::new(),
            global: HashMap::new(),
            _kind: PhantomData,
        }
    }

    /// Freeze the registrations.
    pub fn build(self) -> ProviderRegistry<K> {
        tracing::debug!(
            kind = K::NAME,
            typed = self.typed.len(),
            global = self.global.len(),
            "Provider registry built"
        );
        ProviderRegistry {
            typed: self.typed,
            global: self.global,
            _kind: PhantomData,
        }
    }

    fn insert_typed(
        mut self,
        event_name: &'static str,
        provider: EventProvider,
        handler: RegisteredHandler,
    ) -> Self {
        let key = (event_name.to_string(), provider);
        if let Some(existing) = self.typed.get(&key) {
            tracing::warn!(
                kind = K::NAME,
                event_name,
                provider = %provider,
                kept = existing.handler_name,
                ignored = handler.handler_name,
                "Handler already registered for event and provider, ignoring the new one"
            );
            return self;
        }
        self.typed.insert(key, handler);
        self
    }

    fn insert_global(mut self, provider: EventProvider, handler: RegisteredHandler) -> Self {
        if let Some(existing) = self.global.get(&provider) {
            tracing::warn!(
                kind = K::NAME,
                provider = %provider,
                kept = existing.handler_name,
                ignored = handler.handler_name,
                "Global handler already registered for provider, ignoring the new one"
            );
            return self;
        }
        self.global.insert(provider, handler);
        self
    }
}

impl ProviderRegistryBuilder<Outbox> {
    /// Register `publisher` for events of type `E` sent through `provider`.
    pub fn add_publisher<E, P>(self, provider: EventProvider, publisher: P) -> Self
    where
        E: SendEvent,
        P: EventPublisher<E>,
    {
        let handler = RegisteredHandler::new(
            TypedPublisher {
                publisher,
                _event: PhantomData::<fn() -> E>,
            },
            EventCapabilities::of::<E>(),
            type_name::<P>(),
        );
        self.insert_typed(E::EVENT_NAME, provider, handler)
    }

    /// Register `publisher` for every event of `provider` without a typed publisher.
    pub fn add_global_publisher<P: GlobalEventPublisher>(
        self,
        provider: EventProvider,
        publisher: P,
    ) -> Self {
        let handler = RegisteredHandler::new(
            GlobalPublisher(publisher),
            EventCapabilities::all(),
            type_name::<P>(),
        );
        self.insert_global(provider, handler)
    }
}

impl ProviderRegistryBuilder<Inbox> {
    /// Register `receiver` for events of type `E` received through `provider`.
    pub fn add_receiver<E, R>(self, provider: EventProvider, receiver: R) -> Self
    where
        E: ReceiveEvent,
        R: EventReceiver<E>,
    {
        let handler = RegisteredHandler::new(
            TypedReceiver {
                receiver,
                _event: PhantomData::<fn() -> E>,
            },
            EventCapabilities::of::<E>(),
            type_name::<R>(),
        );
        self.insert_typed(E::EVENT_NAME, provider, handler)
    }

    /// Register `receiver` for every event of `provider` without a typed receiver.
    pub fn add_global_receiver<R: GlobalEventReceiver>(
        self,
        provider: EventProvider,
        receiver: R,
    ) -> Self {
        let handler = RegisteredHandler::new(
            GlobalReceiver(receiver),
            EventCapabilities::all(),
            type_name::<R>(),
        );
        self.insert_global(provider, handler)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Dispatchers
// ════════════════════════════════════════════════════════════════════════════

struct TypedPublisher<E, P> {
    publisher: P,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, P> RecordDispatcher for TypedPublisher<E, P>
where
    E: SendEvent,
    P: EventPublisher<E>,
{
    async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError> {
        let event = record.to_event::<E>()?;
        self.publisher.publish(event, &record.event_path).await
    }
}

struct TypedReceiver<E, R> {
    receiver: R,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, R> RecordDispatcher for TypedReceiver<E, R>
where
    E: ReceiveEvent,
    R: EventReceiver<E>,
{
    async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError> {
        let event = record.to_event::<E>()?;
        self.receiver.receive(event, &record.event_path).await
    }
}

struct GlobalPublisher<P>(P);

#[async_trait]
impl<P: GlobalEventPublisher> RecordDispatcher for GlobalPublisher<P> {
    async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError> {
        self.0.publish(raw_event(record)?).await
    }
}

struct GlobalReceiver<R>(R);

#[async_trait]
impl<R: GlobalEventReceiver> RecordDispatcher for GlobalReceiver<R> {
    async fn dispatch(&self, record: &EventRecord) -> Result<bool, DomainError> {
        self.0.receive(raw_event(record)?).await
    }
}

fn raw_event(record: &EventRecord) -> Result<RawEvent, DomainError> {
    Ok(RawEvent {
        id: record.id,
        event_name: record.event_name.clone(),
        event_path: record.event_path.clone(),
        payload: serde_json::from_str(&record.payload)?,
        headers: record.decode_headers()?,
        additional_data: record.decode_additional_data()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_box::BoxedEvent;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct UserCreated {
        id: Uuid,
        name: String,
    }

    impl BoxedEvent for UserCreated {
        const EVENT_NAME: &'static str = "UserCreated";

        fn event_id(&self) -> Uuid {
            self.id
        }
    }

    impl SendEvent for UserCreated {}
    impl ReceiveEvent for UserCreated {}

    struct CountingPublisher {
        calls: Arc<AtomicUsize>,
        result: bool,
    }

    #[async_trait]
    impl EventPublisher<UserCreated> for CountingPublisher {
        async fn publish(&self, _event: UserCreated, _path: &str) -> Result<bool, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result)
        }
    }

    struct EchoGlobalPublisher;

    #[async_trait]
    impl GlobalEventPublisher for EchoGlobalPublisher {
        async fn publish(&self, event: RawEvent) -> Result<bool, DomainError> {
            Ok(event.payload["name"] == "Ada")
        }
    }

    struct NoopReceiver;

    #[async_trait]
    impl EventReceiver<UserCreated> for NoopReceiver {
        async fn receive(&self, _event: UserCreated, _path: &str) -> Result<bool, DomainError> {
            Ok(true)
        }
    }

    fn record(provider: EventProvider) -> EventRecord {
        let event = UserCreated {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
        };
        EventRecord::from_event(event, provider, "users.created").unwrap()
    }

    fn publisher(result: bool) -> (CountingPublisher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingPublisher {
                calls: calls.clone(),
                result,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn typed_handler_resolves_and_dispatches() {
        let (publisher, calls) = publisher(true);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_publisher(EventProvider::MessageBroker, publisher)
            .build();

        let record = record(EventProvider::MessageBroker);
        let handler = match registry.resolve(&record.event_name, record.provider()) {
            Resolution::Typed(handler) => handler,
            other => panic!("expected typed handler, got {:?}", other),
        };

        assert!(handler.dispatch(&record).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.capabilities(), EventCapabilities::default());
    }

    #[test]
    fn other_provider_is_a_mismatch() {
        let (publisher, _) = publisher(true);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_publisher(EventProvider::MessageBroker, publisher)
            .build();

        match registry.resolve("UserCreated", Some(EventProvider::Sms)) {
            Resolution::ProviderMismatch { configured } => {
                assert_eq!(configured, vec![EventProvider::MessageBroker]);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_is_not_found() {
        let registry = ProviderRegistry::<Outbox>::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("UserCreated", Some(EventProvider::MessageBroker)),
            Resolution::NotFound
        ));
    }

    #[test]
    fn unrecognized_provider_never_resolves_a_handler() {
        let (publisher, _) = publisher(true);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_publisher(EventProvider::MessageBroker, publisher)
            .add_global_publisher(EventProvider::MessageBroker, EchoGlobalPublisher)
            .build();

        assert!(matches!(
            registry.resolve("UserCreated", None),
            Resolution::ProviderMismatch { .. }
        ));
        assert!(matches!(registry.resolve("Other", None), Resolution::NotFound));
    }

    #[tokio::test]
    async fn global_handler_covers_events_without_typed_handler() {
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_global_publisher(EventProvider::WebHook, EchoGlobalPublisher)
            .build();

        let record = record(EventProvider::WebHook);
        let handler = match registry.resolve(&record.event_name, record.provider()) {
            Resolution::Global(handler) => handler,
            other => panic!("expected global handler, got {:?}", other),
        };

        assert!(handler.dispatch(&record).await.unwrap());
        assert_eq!(handler.capabilities(), EventCapabilities::all());
        assert!(registry.has_global(EventProvider::WebHook));
    }

    #[test]
    fn typed_handler_wins_over_global() {
        let (publisher, _) = publisher(true);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_global_publisher(EventProvider::MessageBroker, EchoGlobalPublisher)
            .add_publisher(EventProvider::MessageBroker, publisher)
            .build();

        assert!(matches!(
            registry.resolve("UserCreated", Some(EventProvider::MessageBroker)),
            Resolution::Typed(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_the_first() {
        let (first, first_calls) = publisher(true);
        let (second, second_calls) = publisher(false);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_publisher(EventProvider::MessageBroker, first)
            .add_publisher(EventProvider::MessageBroker, second)
            .build();

        assert_eq!(registry.len(), 1);
        let record = record(EventProvider::MessageBroker);
        if let Resolution::Typed(handler) = registry.resolve(&record.event_name, record.provider())
        {
            assert!(handler.dispatch(&record).await.unwrap());
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn receivers_register_on_inbox_registry() {
        let registry = ProviderRegistry::<Inbox>::builder()
            .add_receiver(EventProvider::MessageBroker, NoopReceiver)
            .build();

        let record = record(EventProvider::MessageBroker);
        match registry.resolve(&record.event_name, record.provider()) {
            Resolution::Typed(handler) => {
                assert!(handler.handler_name().ends_with("NoopReceiver"));
                assert!(handler.dispatch(&record).await.unwrap());
            }
            other => panic!("expected typed receiver, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_a_serialization_error() {
        let (publisher, calls) = publisher(true);
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_publisher(EventProvider::MessageBroker, publisher)
            .build();

        let mut record = record(EventProvider::MessageBroker);
        record.payload = "{not json".to_string();

        if let Resolution::Typed(handler) = registry.resolve(&record.event_name, record.provider())
        {
            let err = handler.dispatch(&record).await.unwrap_err();
            assert_eq!(err.code, crate::domain::foundation::ErrorCode::SerializationError);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
