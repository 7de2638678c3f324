//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the `/events` endpoint.
//! The fan-out core (Manager, ConnectionRegistry, envelopes) lives in the
//! `sse` crate.

pub mod handler;
