//! Cooperative cancellation on a `watch` channel
//!
//! `true` on the channel means "stop starting new work". A dropped sender never
//! cancels anything.

use std::time::Duration;
use tokio::sync::watch;

pub fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Resolves once shutdown has been signalled
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleeps for `duration`; returns true when interrupted by shutdown
pub async fn sleep_or_shutdown(rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = wait_for_shutdown(rx) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_is_interrupted() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(sleep_or_shutdown(&mut rx, Duration::from_secs(60)).await);
        assert!(is_shutdown(&rx));
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(!sleep_or_shutdown(&mut rx, Duration::from_millis(10)).await);
    }
}
