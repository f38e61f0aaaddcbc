//! Direction markers for the two event tables.

/// Marker for one direction of event storage.
///
/// Used as a type parameter so the outbox and inbox share one dispatch
/// implementation while keeping their handlers apart at compile time.
pub trait EventBoxKind: Send + Sync + 'static {
    /// Default table name, also used in log messages.
    const NAME: &'static str;

    /// Verb used in log messages ("publish" / "receive").
    const ACTION: &'static str;
}

/// Outgoing events awaiting delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct Outbox;

/// Incoming events awaiting handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inbox;

impl EventBoxKind for Outbox {
    const NAME: &'static str = "Outbox";
    const ACTION: &'static str = "publish";
}

impl EventBoxKind for Inbox {
    const NAME: &'static str = "Inbox";
    const ACTION: &'static str = "receive";
}
