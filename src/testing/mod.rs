//! Test support utilities.
//!
//! Provides a dispatcher double that records deliveries instead of
//! performing them, with scriptable failures.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::dispatch::{DeliveryError, Dispatcher, Receipt};

/// One recorded delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDelivery {
    pub target: String,
    pub payload: String,
}

/// Dispatcher that records every delivery attempt in memory.
///
/// While `failing` is set, attempts are still recorded but return a
/// delivery error, so tests can exercise the failure path.
pub struct RecordingDispatcher {
    deliveries: Mutex<Vec<RecordedDelivery>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All recorded attempts, in order.
    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded attempts.
    pub fn delivery_count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn deliver(&self, target: &str, payload: &str) -> Result<Receipt, DeliveryError> {
        let count = {
            let mut deliveries = self
                .deliveries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            deliveries.push(RecordedDelivery {
                target: target.to_string(),
                payload: payload.to_string(),
            });
            deliveries.len()
        };

        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::new("scripted failure"));
        }
        Ok(Receipt::with_id(format!("receipt-{}", count)))
    }
}
