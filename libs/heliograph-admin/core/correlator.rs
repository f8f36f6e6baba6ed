//! Request correlation: one-shot response waiters keyed by token
//!
//! The waiter is registered before the outbound frame is emitted so a
//! response arriving in the same tick always finds it. Waiters are removed
//! on first match; a second response carrying the same token is dropped.
//!
//! There is no per-request expiry. Commands stay pending until a matching
//! response arrives, however long that takes; the only forced termination
//! lives in the readiness gate. `pending_count` exists so callers can watch
//! for tokens that never resolved.

use crate::core::protocol::ApiResponse;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Table of outstanding requests, exclusively owned by the session
#[derive(Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<ApiResponse>>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `token` and return its receiving half
    ///
    /// Must be called before the command frame is emitted. A caller-supplied
    /// token colliding with an outstanding one replaces the older waiter,
    /// which then resolves as a closed channel.
    pub fn register(&self, token: &str) -> oneshot::Receiver<ApiResponse> {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(token.to_string(), tx).is_some() {
            debug!(token, "replaced an outstanding waiter with the same token");
        }
        rx
    }

    /// Resolve the waiter for `token`, if one is still outstanding
    ///
    /// Returns false when no waiter matched, which covers both duplicate
    /// responses and tokens this process never issued.
    pub fn resolve(&self, token: &str, response: ApiResponse) -> bool {
        let waiter = self.pending.lock().remove(token);
        match waiter {
            Some(tx) => {
                // A dropped receiver just means the caller went away first.
                let _ = tx.send(response);
                true
            }
            None => {
                debug!(token, "response without a matching waiter, ignoring");
                false
            }
        }
    }

    /// Drop the waiter for `token` without resolving it
    pub fn forget(&self, token: &str) {
        self.pending.lock().remove(token);
    }

    /// Number of requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
