//! Decodes raw inbound messages into [`Event`]s.
//!
//! Producers publish either the event JSON itself or that JSON wrapped once
//! more as a JSON string. Both forms decode to the same [`Event`].

use crate::Event;
use serde_json::value::RawValue;
use std::error::Error as StdError;
use std::fmt;

/// Why a raw message could not be decoded. The message is dropped.
#[derive(Debug)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub source: serde_json::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The message is not valid JSON.
    Outer,
    /// The message is a JSON string whose contents are not valid JSON.
    Nested,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::Outer => write!(f, "malformed message: {}", self.source),
            DecodeErrorKind::Nested => write!(f, "malformed nested payload: {}", self.source),
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Decode one raw text message.
///
/// The JSON is validated but never converted to a `Value`, so numbers of any
/// size or precision pass through exactly as written.
pub fn decode(raw: &str) -> Result<Event, DecodeError> {
    let outer: Box<RawValue> = serde_json::from_str(raw).map_err(|source| DecodeError {
        kind: DecodeErrorKind::Outer,
        source,
    })?;

    if !outer.get().starts_with('"') {
        return Ok(Event::from_raw(outer));
    }

    let nested: String = serde_json::from_str(outer.get()).map_err(|source| DecodeError {
        kind: DecodeErrorKind::Outer,
        source,
    })?;

    serde_json::from_str::<Box<RawValue>>(&nested)
        .map(Event::from_raw)
        .map_err(|source| DecodeError {
            kind: DecodeErrorKind::Nested,
            source,
        })
}
