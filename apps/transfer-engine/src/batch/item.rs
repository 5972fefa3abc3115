//! Batched item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discrete write waiting to be applied in bulk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Type tag used to pick the bulk handler.
    pub kind: String,
    /// Item body.
    pub payload: serde_json::Value,
    /// When the item was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl BatchItem {
    /// Create an item stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }

    /// Create an item from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn from_payload<T: Serialize + ?Sized>(
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }
}
