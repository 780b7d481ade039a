// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Cooperative cancellation
//!
//! The executor checks the token between module invocations, never while
//! a module is running.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared stop signal; clones observe the same state
#[derive(Debug, Clone)]
pub struct CancellationToken {
    stop_sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (stop_sender, _) = watch::channel(false);
        Self {
            stop_sender: Arc::new(stop_sender),
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.stop_sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.stop_sender.borrow()
    }

    /// Receiver that flips to `true` once cancellation is requested
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_sender.subscribe()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        let mut stop_receiver = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = stop_receiver.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let observer = token.clone();

        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        let stop_receiver = token.subscribe();

        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(*stop_receiver.borrow());
    }
}
