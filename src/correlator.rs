//! Matches inbound replies to outbound requests by request id.
//!
//! Each waiting caller owns the receiving end of a one-shot channel; the
//! table owns the sending end until the reader resolves it. A slot is
//! resolved at most once: resolving removes it from the table.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Receiving end handed to the caller that issued a request.
pub type Waiter = oneshot::Receiver<Result<Value>>;

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u32, oneshot::Sender<Result<Value>>>,
}

impl Correlator {
    /// Registers a waiter for `request_id`.
    ///
    /// Must happen before the request is written, so that a fast reply
    /// cannot arrive before anyone waits for it. A stale waiter registered
    /// under the same id is released.
    pub fn register(&mut self, request_id: u32) -> Waiter {
        let (tx, rx) = oneshot::channel();
        if let Some(stale) = self.pending.insert(request_id, tx) {
            warn!("request id {request_id} was still pending");
            let _ = stale.send(Err(Error::aborted(format!(
                "request id {request_id} reused"
            ))));
        }
        rx
    }

    /// Drops the waiter for `request_id` without resolving it.
    pub fn unregister(&mut self, request_id: u32) {
        self.pending.remove(&request_id);
    }

    /// Hands `result` to the caller waiting on `request_id`.
    ///
    /// Returns `false` if nobody was waiting, or the caller gave up.
    pub fn resolve(&mut self, request_id: u32, result: Result<Value>) -> bool {
        match self.pending.remove(&request_id) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Releases every waiter with an error, e.g. when the connection died.
    pub fn release_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for (request_id, tx) in self.pending.drain() {
            let _ = tx.send(Err(Error::aborted(format!(
                "request {request_id} released: {reason}"
            ))));
        }

        if count > 0 {
            debug!("released {count} pending requests: {reason}");
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
