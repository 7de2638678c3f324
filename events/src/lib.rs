//! Inbound side of the relay.
//!
//! This crate turns raw messages delivered by the message-queue subscription
//! into [`Event`]s and hands them, one at a time, to an [`EventHandler`].
//!
//! # Architecture
//!
//! - **Event**: an opaque JSON value. The relay never inspects its contents.
//! - **decoder**: parses one raw text message into an `Event`, dropping
//!   malformed input with a diagnostic.
//! - **source**: the Redis pub/sub subscription that produces raw messages
//!   onto a channel.
//! - **relay**: the single consumer loop that decodes each raw message and
//!   awaits the handler before taking the next one, so handlers observe
//!   events in arrival order.
//!
//! This crate has no dependencies on internal crates; the fan-out side
//! implements [`EventHandler`].

use async_trait::async_trait;
use serde_json::value::{to_raw_value, RawValue};
use serde_json::Value;

pub mod decoder;
pub mod relay;
pub mod source;

pub use decoder::{decode, DecodeError};
pub use relay::{relay, RelayStats};

/// One inbound event. The payload has no required schema and is kept as the
/// validated JSON text it arrived as, so no value is reinterpreted on the way
/// through.
#[derive(Debug, Clone)]
pub struct Event(Box<RawValue>);

impl Event {
    pub fn from_raw(payload: Box<RawValue>) -> Self {
        Self(payload)
    }

    pub fn from_value(payload: &Value) -> Result<Self, serde_json::Error> {
        to_raw_value(payload).map(Self)
    }

    pub fn payload(&self) -> &RawValue {
        &self.0
    }

    /// Renders the value carried on an SSE `data:` line.
    ///
    /// The event's JSON text is encoded again as a JSON string literal, so
    /// receivers decode it twice.
    pub fn to_wire_data(&self) -> String {
        Value::String(self.0.get().to_owned()).to_string()
    }
}

/// Trait for handling decoded inbound events.
/// Implementations perform the side effect of relaying, e.g. SSE fan-out.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}
