//! Application layer - Entry points of the event storage.
//!
//! - `EventSender` / `EventReceiverManager` store events (the write side)
//! - `DispatchManager` runs poll cycles that hand stored events to handlers
//! - `ProviderRegistry` maps event names and providers to those handlers

mod dispatch_manager;
mod receiver;
mod registry;
mod sender;
pub mod shutdown;

pub use dispatch_manager::{
    DispatchConfig, DispatchManager, DispatchOutcome, DispatchSummary, InboxDispatchManager,
    OutboxDispatchManager, TRY_AFTER_ONE_DAY_MINUTES,
};
pub use receiver::EventReceiverManager;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder, RegisteredHandler, Resolution};
pub use sender::EventSender;
