//! Message delivery abstraction.
//!
//! The engine hands a job's target and payload to a [`Dispatcher`] and
//! records the outcome; it never interprets either field itself.

mod webhook;

pub use webhook::WebhookDispatcher;

use async_trait::async_trait;
use thiserror::Error;

/// A failed delivery attempt.
///
/// Delivery failures are terminal for the attempt: the outcome is recorded
/// and the job's schedule decides whether there will be another.
#[derive(Debug, Error)]
#[error("delivery failed: {reason}")]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Proof of a successful delivery.
#[derive(Debug, Clone, Default)]
pub struct Receipt {
    /// Downstream message identifier, when the target reports one.
    pub id: Option<String>,
}

impl Receipt {
    /// A receipt carrying a downstream message id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }
}

/// Delivers payloads to targets.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver a payload to a target, returning a receipt on success.
    async fn deliver(&self, target: &str, payload: &str) -> Result<Receipt, DeliveryError>;
}
