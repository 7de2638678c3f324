//! Server-Sent Events (SSE) fan-out for relayed events.
//!
//! This crate owns the set of open event streams and pushes every inbound
//! event to all of them.
//!
//! # Architecture
//!
//! - **Identity-keyed registry**: open connections live in a DashMap keyed by
//!   a server-generated `ConnectionId`, so removal is O(1) and idempotent.
//! - **Snapshot broadcast**: each broadcast copies the registry, then writes to
//!   the copy without holding any lock. Connections added mid-broadcast miss
//!   that event; connections already registered never see duplicates.
//! - **One envelope per event**: the `id:`/`data:` frame is rendered once and
//!   every recipient gets a refcounted clone of the same bytes.
//! - **Bounded writes**: each connection has a bounded frame buffer and every
//!   write has a timeout. A closed or stalled connection is removed, and the
//!   failure never reaches the inbound side or other connections.
//! - **Ephemeral**: nothing is retained after a broadcast. Late joiners do not
//!   get history.
//!
//! # Message Flow
//!
//! 1. Client opens `GET /events`; the web layer registers a connection and
//!    streams the frames from its buffer as the response body.
//! 2. The relay loop decodes an inbound message and calls `SseRelayHandler`.
//! 3. `Manager::broadcast` stamps a clock-time id, builds the envelope and
//!    writes it to every connection in a registry snapshot.
//! 4. A failed write, or the client going away, unregisters the connection.
//!
//! # Modules
//!
//! - `connection`: `ConnectionRegistry`, `OutputConnection` and `ConnectionId`
//! - `manager`: registration and broadcast
//! - `message`: `BroadcastEnvelope` wire rendering and event ids
//! - `relay_handler`: bridge from the inbound relay loop to the manager

pub mod connection;
pub mod manager;
pub mod message;
pub mod relay_handler;

pub use manager::Manager;
pub use relay_handler::SseRelayHandler;
