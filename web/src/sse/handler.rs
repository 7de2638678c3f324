use crate::error::{Error, Result};
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use log::*;
use service::AppState;
use sse::connection::ConnectionId;
use sse::message::KEEP_ALIVE_FRAME;
use sse::Manager;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{interval_at, Instant};

const EVENT_STREAM: &str = "text/event-stream";

/// Unregisters its connection when dropped. It lives inside the response
/// stream, so it fires both when the client disconnects (hyper drops the body)
/// and when the stream ends because the connection was closed.
struct ConnectionGuard {
    manager: Arc<Manager>,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister_connection(&self.connection_id);
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers.get(ACCEPT).and_then(|value| value.to_str().ok()) == Some(EVENT_STREAM)
}

/// Opens a long-lived event stream. Every relayed event is pushed to the
/// client as an `id:`/`data:` block until either side closes the connection.
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response> {
    if !accepts_event_stream(&headers) {
        return Err(Error::InvalidSubscriptionRequest);
    }

    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let manager = app_state.sse_manager.clone();
    let (connection_id, mut output) = manager.register_connection(peer)?;

    match peer {
        Some(addr) => info!("Connection added for {}", addr.ip()),
        None => info!("Connection added for unknown peer"),
    }

    let guard = ConnectionGuard {
        manager,
        connection_id,
    };
    let keep_alive = app_state.config.keep_alive_interval();

    let stream = stream! {
        let _guard = guard;
        let mut ticker = interval_at(Instant::now() + keep_alive, keep_alive);

        loop {
            let next = tokio::select! {
                frame = output.next_frame() => frame,
                _ = ticker.tick() => Some(Bytes::from_static(KEEP_ALIVE_FRAME)),
            };

            match next {
                Some(frame) => {
                    ticker.reset();
                    yield Ok::<Bytes, Infallible>(frame);
                }
                None => break,
            }
        }

        debug!("SSE stream ended, cleaning up");
    };

    Ok((
        [
            (CONTENT_TYPE, EVENT_STREAM),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_event_stream_requires_exact_header() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_event_stream(&headers));

        headers.insert(ACCEPT, "text/html".parse().unwrap());
        assert!(!accepts_event_stream(&headers));

        headers.insert(ACCEPT, "text/event-stream".parse().unwrap());
        assert!(accepts_event_stream(&headers));
    }

    #[test]
    fn test_dropping_guard_unregisters_connection() {
        let manager = Arc::new(Manager::default());
        let (connection_id, _output) = manager.register_connection(None).unwrap();

        drop(ConnectionGuard {
            manager: manager.clone(),
            connection_id: connection_id.clone(),
        });

        assert!(!manager.is_registered(&connection_id));
        assert_eq!(manager.connection_count(), 0);
    }
}
