use bytes::{BufMut, Bytes, BytesMut};
use chrono::Local;
use events::Event;

/// Comment frame written to idle streams. Clients ignore it.
pub const KEEP_ALIVE_FRAME: &[u8] = b":\n\n";

/// Generates the id stamped on a broadcast: the local wall-clock time with
/// second resolution, e.g. `3:04:05 PM`.
///
/// Two broadcasts within the same second share an id. Clients only echo it
/// back as `Last-Event-ID`, so it is never used for ordering.
pub fn event_id_now() -> String {
    Local::now().format("%-I:%M:%S %p").to_string()
}

/// One event rendered for the wire, built once per broadcast and shared by
/// every recipient.
#[derive(Debug, Clone)]
pub struct BroadcastEnvelope {
    id: String,
    frame: Bytes,
}

impl BroadcastEnvelope {
    pub fn new(id: String, event: &Event) -> Self {
        let data = event.to_wire_data();

        let mut frame = BytesMut::with_capacity(id.len() + data.len() + 12);
        frame.put_slice(b"id: ");
        frame.put_slice(id.as_bytes());
        frame.put_u8(b'\n');
        frame.put_slice(b"data: ");
        frame.put_slice(data.as_bytes());
        frame.put_slice(b"\n\n");

        Self {
            id,
            frame: frame.freeze(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The complete `id:`/`data:` block, ready to be written as one chunk.
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }
}

/// Helpers for tests that read frames back off a connection.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use events::Event;
    use serde_json::Value;

    pub fn event(payload: Value) -> Event {
        Event::from_value(&payload).unwrap()
    }

    /// Split one `id:`/`data:` block into its id and the twice-decoded event.
    pub fn parse_frame(frame: &[u8]) -> (String, Value) {
        let text = std::str::from_utf8(frame).unwrap();
        assert!(text.ends_with("\n\n"), "frame must end with a blank line");

        let mut lines = text.lines();
        let id = lines.next().unwrap().strip_prefix("id: ").unwrap().to_string();
        let data = lines.next().unwrap().strip_prefix("data: ").unwrap();
        let inner: String = serde_json::from_str(data).unwrap();
        (id, serde_json::from_str(&inner).unwrap())
    }
}
