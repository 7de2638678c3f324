use anyhow::{Context, Result};
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub id: Option<String>,
    pub data: Value,
}

/// Undo the relay's wire encoding: the `data:` line is a JSON string whose
/// contents are the event JSON.
pub fn decode_data(data: &str) -> Result<Value> {
    let inner: String = serde_json::from_str(data).context("data is not a JSON string")?;
    serde_json::from_str(&inner).context("data string does not contain JSON")
}

pub struct Connection {
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub fn establish(base_url: &str) -> Result<Self> {
        let url = format!("{}/events", base_url.trim_end_matches('/'));
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .header("Accept", "text/event-stream")?
            .build();

        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => match decode_data(&event.data) {
                        Ok(data) => {
                            let sse_event = Event {
                                id: event.id,
                                data,
                            };

                            if tx.send(sse_event).is_err() {
                                debug!("SSE receiver dropped");
                                break;
                            }
                        }
                        Err(e) => warn!("Undecodable event data {:?}: {e:#}", event.data),
                    },
                    Some(Ok(_)) => {
                        // Comments (keep-alive) carry nothing
                    }
                    Some(Err(e)) => {
                        warn!("SSE error for {url}: {e}");
                    }
                    None => {
                        debug!("SSE stream ended for {url}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            event_rx: rx,
            _handle: handle,
        })
    }

    pub async fn next_event(&mut self, timeout: Option<Duration>) -> Result<Event> {
        let event = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.event_rx.recv())
                .await
                .context("Timeout waiting for event")?,
            None => self.event_rx.recv().await,
        };

        event.context("SSE connection closed")
    }
}
