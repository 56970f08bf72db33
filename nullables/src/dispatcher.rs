//! Nullable dispatcher: records external messages instead of sending them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use verdict_messages::{DispatchError, DownstreamMessage, MessageDispatcher};
use verdict_types::TxHash;

/// Captures every dispatched message for inspection.
#[derive(Debug, Default)]
pub struct NullDispatcher {
    sent: Mutex<Vec<(TxHash, DownstreamMessage)>>,
    reject: AtomicBool,
}

impl NullDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages dispatched so far, in order.
    pub fn sent(&self) -> Vec<(TxHash, DownstreamMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl MessageDispatcher for NullDispatcher {
    fn dispatch(&self, origin: &TxHash, message: &DownstreamMessage) -> Result<(), DispatchError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected {
                target: message.target.to_string(),
                reason: "null dispatcher set to reject".into(),
            });
        }
        self.sent.lock().unwrap().push((*origin, message.clone()));
        Ok(())
    }
}
