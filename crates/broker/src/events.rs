// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Event Hub: fan-out of completion notifications with handler-fault
//! isolation. Grounded on the teacher's `Aggregator` (a `broadcast::Sender`
//! fanned out to per-connection forwarding tasks in `ws_mux.rs`),
//! generalized here from "forward to a websocket client" to "invoke a
//! typed callback, isolated from other callbacks by its own task".

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::types::CompletionEvent;

const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out hub for [`CompletionEvent`]s.
pub struct EventHub {
    tx: broadcast::Sender<CompletionEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a completion. Fire-and-forget: returns immediately once the
    /// event is queued to the broadcast channel, regardless of how many
    /// (if any) subscribers currently exist.
    pub fn publish(&self, event: CompletionEvent) {
        // No receivers is not an error: a completion for a session that has
        // already disposed itself is simply dropped.
        let _ = self.tx.send(event);
    }

    /// Raw subscription to the completion stream, in emission order.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.tx.subscribe()
    }

    /// Register a callback invoked once per completion event. Each
    /// invocation runs in its own spawned task — isolated from every other
    /// handler and from the forwarding loop itself — and a panicking
    /// handler is caught and logged rather than propagated or allowed to
    /// stop further dispatch.
    ///
    /// Returns a [`Subscription`] whose `Drop` unsubscribes.
    pub fn subscribe_handler<F>(&self, handler: F) -> Subscription
    where
        F: Fn(CompletionEvent) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = rx.recv() => {
                        match received {
                            Ok(event) => {
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move {
                                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                                        handler(event)
                                    }));
                                    if outcome.is_err() {
                                        tracing::error!("event handler panicked");
                                    }
                                });
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "event hub subscriber lagged, dropped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Subscription { cancel }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription created by [`EventHub::subscribe_handler`]. Dropping
/// it (or calling `unsubscribe` explicitly) stops the forwarding task; no
/// further invocations of the handler occur afterward.
pub struct Subscription {
    cancel: CancellationToken,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
