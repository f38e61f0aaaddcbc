//! Cancellation signal shared by the dispatch manager and background services.
//!
//! The signal is a `watch` channel of `bool`; `true` means "stop". A dropped
//! sender without a prior `true` never cancels.

use tokio::sync::watch;

/// Create a shutdown channel in the "running" state.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Whether shutdown was already requested.
pub fn is_requested(receiver: &watch::Receiver<bool>) -> bool {
    *receiver.borrow()
}

/// Resolve once shutdown is requested.
pub async fn requested(mut receiver: watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
