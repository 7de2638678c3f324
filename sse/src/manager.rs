use crate::connection::{
    ConnectionId, ConnectionOutput, ConnectionRegistry, OutputConnection, RegistryError,
};
use crate::message::{event_id_now, BroadcastEnvelope};
use events::Event;
use futures::future::join_all;
use log::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tuning for per-connection buffering and write timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// How long one write may wait for a slow client before the client is dropped.
    pub write_timeout: Duration,
    /// Frames buffered per connection.
    pub connection_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(2),
            connection_buffer: 32,
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub event_id: String,
    pub delivered: usize,
    pub failed: usize,
}

/// Owns the connection registry and fans envelopes out to it.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    settings: Settings,
    closing: AtomicBool,
}

impl Manager {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            settings,
            closing: AtomicBool::new(false),
        }
    }

    /// Register a new connection and return its ID along with the output that
    /// feeds its response body. Fails once `close_all` has been called.
    pub fn register_connection(
        &self,
        peer: Option<SocketAddr>,
    ) -> Result<(ConnectionId, ConnectionOutput), RegistryError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }

        let (connection, output) = OutputConnection::open(peer, self.settings.connection_buffer);
        let connection_id = connection.id().clone();
        self.registry.add(connection)?;

        // A close_all that ran between the check above and the add has already
        // drained the registry and would never see this connection.
        if self.closing.load(Ordering::SeqCst) {
            self.registry.remove(&connection_id);
            return Err(RegistryError::Closed);
        }

        info!(
            "Registered SSE connection {} ({} open)",
            connection_id,
            self.registry.len()
        );

        Ok((connection_id, output))
    }

    /// Unregister and close a connection by ID. Returns false if it was
    /// already gone.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) -> bool {
        match self.registry.remove(connection_id) {
            Some(connection) => {
                match connection.peer() {
                    Some(addr) => info!(
                        "Connection {} for {} closed ({} open)",
                        connection_id,
                        addr.ip(),
                        self.registry.len()
                    ),
                    None => info!(
                        "Connection {} closed ({} open)",
                        connection_id,
                        self.registry.len()
                    ),
                }
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.contains(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Stamp an event with the current clock id and send it to every open
    /// connection.
    pub async fn broadcast(&self, event: &Event) -> BroadcastReport {
        let envelope = BroadcastEnvelope::new(event_id_now(), event);
        self.send_envelope(&envelope).await
    }

    /// Write one envelope to every connection in a registry snapshot.
    ///
    /// Writes run concurrently and each is bounded by the write timeout. A
    /// failed write unregisters that connection and does not affect the rest.
    pub async fn send_envelope(&self, envelope: &BroadcastEnvelope) -> BroadcastReport {
        let snapshot = self.registry.snapshot();
        let timeout = self.settings.write_timeout;

        let results = join_all(snapshot.iter().map(|connection| async move {
            let result = connection.write(envelope.frame().clone(), timeout).await;
            (connection, result)
        }))
        .await;

        let mut report = BroadcastReport {
            event_id: envelope.id().to_string(),
            delivered: 0,
            failed: 0,
        };

        for (connection, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to send event {} to connection {}: {}. Removing connection.",
                        envelope.id(),
                        connection.id(),
                        e
                    );
                    self.unregister_connection(connection.id());
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Stop accepting connections and close every open one. Each response
    /// stream ends as soon as its connection is closed.
    pub fn close_all(&self) -> usize {
        self.closing.store(true, Ordering::SeqCst);
        let closed = self.registry.drain();
        info!("Closed {closed} SSE connection(s)");
        closed
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_support::{event, parse_frame};
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            write_timeout: Duration::from_millis(50),
            connection_buffer: 8,
        }
    }

    async fn next_payload(output: &mut ConnectionOutput) -> serde_json::Value {
        parse_frame(&output.next_frame().await.unwrap()).1
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection_with_shared_id() {
        let manager = Manager::new(settings());
        let mut outputs: Vec<_> = (0..3)
            .map(|_| manager.register_connection(None).unwrap().1)
            .collect();
        let payload = json!({"type": "WatchEvent", "from": "A", "to": "B"});

        let report = manager.broadcast(&event(payload.clone())).await;

        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        for output in outputs.iter_mut() {
            let (id, data) = parse_frame(&output.next_frame().await.unwrap());
            assert_eq!(id, report.event_id);
            assert_eq!(data, payload);
        }
    }

    #[tokio::test]
    async fn test_disconnected_client_stops_receiving_and_is_removed() {
        let manager = Manager::new(settings());
        let (_, mut output_a) = manager.register_connection(None).unwrap();
        let (_, mut output_b) = manager.register_connection(None).unwrap();
        let (gone_id, output_gone) = manager.register_connection(None).unwrap();

        manager
            .broadcast(&event(json!({"type": "WatchEvent", "from": "A", "to": "B"})))
            .await;
        assert_eq!(manager.connection_count(), 3);

        drop(output_gone);
        let second = json!({"type": "ForkEvent"});
        let report = manager.broadcast(&event(second.clone())).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(manager.connection_count(), 2);
        assert!(!manager.is_registered(&gone_id));
        for output in [&mut output_a, &mut output_b] {
            output.next_frame().await.unwrap();
            assert_eq!(next_payload(output).await, second);
        }
    }

    #[tokio::test]
    async fn test_failed_connection_is_absent_from_next_broadcast() {
        let manager = Manager::new(settings());
        let (_, mut stalled) = manager.register_connection(None).unwrap();
        let (_, mut healthy) = manager.register_connection(None).unwrap();

        // Nobody reads `stalled`, so its buffer fills and the next write times out.
        for n in 0..settings().connection_buffer {
            manager.broadcast(&event(json!({ "n": n }))).await;
            healthy.next_frame().await.unwrap();
        }
        let report = manager.broadcast(&event(json!({"n": "overflow"}))).await;
        assert_eq!(report.failed, 1);
        assert_eq!(manager.connection_count(), 1);
        healthy.next_frame().await.unwrap();

        let report = manager.broadcast(&event(json!({"n": "after"}))).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(next_payload(&mut healthy).await, json!({"n": "after"}));

        // Frames buffered before the timeout are never handed to the client.
        assert!(stalled.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_events_arrive_in_broadcast_order() {
        let manager = Manager::new(settings());
        let (_, mut output) = manager.register_connection(None).unwrap();

        for n in 0..5 {
            manager.broadcast(&event(json!({ "seq": n }))).await;
        }

        for n in 0..5 {
            assert_eq!(next_payload(&mut output).await, json!({ "seq": n }));
        }
    }

    #[tokio::test]
    async fn test_connection_registered_after_broadcast_misses_it() {
        let manager = Manager::new(settings());
        manager.broadcast(&event(json!({"early": true}))).await;

        let (_, mut late) = manager.register_connection(None).unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(20), late.next_frame()).await;
        assert!(waited.is_err(), "late connection received an earlier event");
    }

    #[tokio::test]
    async fn test_broadcast_with_no_connections_delivers_nothing() {
        let manager = Manager::default();

        let report = manager.broadcast(&event(json!({}))).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_unregister_twice_is_harmless() {
        let manager = Manager::new(settings());
        let (id, _output) = manager.register_connection(None).unwrap();

        assert!(manager.unregister_connection(&id));
        assert!(!manager.unregister_connection(&id));
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all_ends_every_stream() {
        let manager = Manager::new(settings());
        let (_, mut output_a) = manager.register_connection(None).unwrap();
        let (_, mut output_b) = manager.register_connection(None).unwrap();

        assert_eq!(manager.close_all(), 2);

        assert!(output_a.next_frame().await.is_none());
        assert!(output_b.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_register_after_close_all_is_refused() {
        let manager = Manager::new(settings());
        manager.close_all();

        let result = manager.register_connection(None);

        assert!(matches!(result, Err(RegistryError::Closed)));
        assert_eq!(manager.connection_count(), 0);
    }
}
