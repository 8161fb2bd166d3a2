//! In-process event distribution.
//!
//! One [`EventBus`] instance is created by the host and threaded through
//! [`ModuleCtx`](crate::context::ModuleCtx). It supports two delivery modes:
//!
//! - **Immediate** ([`EventBus::publish`]): every subscriber of the event type is
//!   awaited in priority order; handler failures are collected, never short-circuit.
//! - **Queued** ([`EventBus::publish_async`]): the event goes onto a bounded queue
//!   drained by a single background worker. Producers never block; a full queue
//!   drops the event. Delivery is at-most-once and FIFO among queued events.

mod bus;
mod handler;

#[cfg(test)]
mod tests;

pub use bus::{
    BusState, EventBus, EventBusError, HandlerFailure, SubscriberInfo, SubscriptionId,
    DEFAULT_QUEUE_CAPACITY,
};
pub use handler::{handler_fn, EventHandler, EventSubscription, FnHandler};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Envelope delivered to every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Deserialize the payload into a typed view.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
