use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::error::Error as StdError;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, Receiver, Sender};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A write to one connection did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionWriteError {
    /// The response stream is gone; the client disconnected.
    Closed,
    /// The client did not drain its buffer within the write timeout.
    TimedOut,
}

impl fmt::Display for ConnectionWriteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionWriteError::Closed => write!(f, "connection closed"),
            ConnectionWriteError::TimedOut => write!(f, "write timed out"),
        }
    }
}

impl StdError for ConnectionWriteError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity is already registered. Identities are generated fresh for
    /// every connection, so this is a bug rather than a client error.
    DuplicateIdentity(ConnectionId),
    /// The server is shutting down and accepts no new connections.
    Closed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::DuplicateIdentity(id) => {
                write!(f, "connection {id} is already registered")
            }
            RegistryError::Closed => write!(f, "registry is closed to new connections"),
        }
    }
}

impl StdError for RegistryError {}

/// One client's open event stream.
///
/// Frames written here are buffered in a bounded channel whose receiving half
/// is the client's HTTP response body. Each frame becomes one body chunk, and
/// the server flushes every chunk as it is produced.
#[derive(Debug, Clone)]
pub struct OutputConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    sender: Sender<Bytes>,
    closed: CancellationToken,
}

/// Receiving half of an [`OutputConnection`], read by the response body.
#[derive(Debug)]
pub struct ConnectionOutput {
    frames: Receiver<Bytes>,
    closed: CancellationToken,
}

impl ConnectionOutput {
    /// The next frame to write, or `None` once the connection is closed.
    /// Frames still buffered when the connection is closed are discarded.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            frame = self.frames.recv() => frame,
        }
    }
}

impl OutputConnection {
    /// Create a connection with a fresh identity, returning the receiving half
    /// that feeds the response body.
    pub fn open(peer: Option<SocketAddr>, buffer: usize) -> (Self, ConnectionOutput) {
        Self::with_id(ConnectionId::new(), peer, buffer)
    }

    pub fn with_id(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        buffer: usize,
    ) -> (Self, ConnectionOutput) {
        let (sender, frames) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();
        let output = ConnectionOutput {
            frames,
            closed: closed.clone(),
        };
        (
            Self {
                id,
                peer,
                sender,
                closed,
            },
            output,
        )
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.sender.is_closed()
    }

    /// Mark the connection closed. Its output stops yielding frames at once.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Queue one frame, waiting at most `timeout` for buffer space.
    pub async fn write(&self, frame: Bytes, timeout: Duration) -> Result<(), ConnectionWriteError> {
        if self.closed.is_cancelled() {
            return Err(ConnectionWriteError::Closed);
        }

        self.sender
            .send_timeout(frame, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ConnectionWriteError::TimedOut,
                SendTimeoutError::Closed(_) => ConnectionWriteError::Closed,
            })
    }
}

/// The set of open connections, keyed by identity for O(1) removal.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, OutputConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Insert a connection - O(1)
    pub fn add(&self, connection: OutputConnection) -> Result<(), RegistryError> {
        match self.connections.entry(connection.id().clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateIdentity(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove and close a connection - O(1). Absent identities are ignored,
    /// since the disconnect and write-failure paths can both try to remove the
    /// same one.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<OutputConnection> {
        self.connections.remove(connection_id).map(|(_, connection)| {
            connection.close();
            connection
        })
    }

    /// Copy out the connections registered right now. The copy is unaffected
    /// by later adds and removes.
    pub fn snapshot(&self) -> Vec<OutputConnection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remove every connection, returning how many were open.
    pub fn drain(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.remove(id).is_some()).count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_snapshot_contains_connection() {
        let registry = ConnectionRegistry::new();
        let (connection, _output) = OutputConnection::open(None, 4);
        let id = connection.id().clone();

        registry.add(connection).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), &id);
        assert!(registry.contains(&id));
    }

    #[test]
    fn test_add_duplicate_identity_is_rejected() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (first, _output1) = OutputConnection::with_id(id.clone(), None, 4);
        let (second, _output2) = OutputConnection::with_id(id.clone(), None, 4);

        registry.add(first).unwrap();

        assert_eq!(
            registry.add(second),
            Err(RegistryError::DuplicateIdentity(id))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_identity_is_a_noop() {
        let registry = ConnectionRegistry::new();
        let (connection, _output) = OutputConnection::open(None, 4);
        registry.add(connection).unwrap();

        assert!(registry.remove(&ConnectionId::new()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_twice_only_removes_once() {
        let registry = ConnectionRegistry::new();
        let (connection, _output) = OutputConnection::open(None, 4);
        let id = connection.id().clone();
        registry.add(connection).unwrap();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_changes() {
        let registry = ConnectionRegistry::new();
        let (a, _output_a) = OutputConnection::open(None, 4);
        let a_id = a.id().clone();
        registry.add(a).unwrap();

        let snapshot = registry.snapshot();

        let (b, _output_b) = OutputConnection::open(None, 4);
        registry.add(b).unwrap();
        registry.remove(&a_id);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), &a_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = ConnectionRegistry::new();
        for _ in 0..3 {
            let (connection, _output) = OutputConnection::open(None, 4);
            registry.add(connection).unwrap();
        }

        assert_eq!(registry.drain(), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_removed_connection_discards_buffered_frames() {
        let registry = ConnectionRegistry::new();
        let (connection, mut output) = OutputConnection::open(None, 4);
        let id = connection.id().clone();
        connection
            .write(Bytes::from_static(b"queued"), Duration::from_millis(10))
            .await
            .unwrap();
        registry.add(connection).unwrap();

        let removed = registry.remove(&id).unwrap();

        assert!(!removed.is_open());
        assert!(output.next_frame().await.is_none());
        assert_eq!(
            removed
                .write(Bytes::from_static(b"late"), Duration::from_millis(10))
                .await,
            Err(ConnectionWriteError::Closed)
        );
    }

    #[tokio::test]
    async fn test_write_to_dropped_receiver_reports_closed() {
        let (connection, output) = OutputConnection::open(None, 4);
        drop(output);

        assert!(!connection.is_open());
        let result = connection
            .write(Bytes::from_static(b"x"), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(ConnectionWriteError::Closed));
    }

    #[tokio::test]
    async fn test_write_to_full_buffer_times_out() {
        let (connection, _output) = OutputConnection::open(None, 1);
        connection
            .write(Bytes::from_static(b"first"), Duration::from_millis(10))
            .await
            .unwrap();

        let result = connection
            .write(Bytes::from_static(b"second"), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(ConnectionWriteError::TimedOut));
    }
}
