//! Redis pub/sub subscription that produces raw inbound messages.

use futures::StreamExt;
use log::*;
use redis::aio::PubSub;
use std::error::Error as StdError;
use std::fmt;
use tokio::sync::mpsc::Sender;

#[derive(Debug)]
pub struct Error {
    pub source: redis::RedisError,
    pub error_kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The Redis URL could not be parsed or the server could not be reached.
    Connect,
    /// The server refused the channel subscription.
    Subscribe,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.error_kind {
            ErrorKind::Connect => write!(f, "failed to connect to event source: {}", self.source),
            ErrorKind::Subscribe => {
                write!(f, "failed to subscribe to event channel: {}", self.source)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// An established subscription to one pub/sub channel.
pub struct Subscription {
    channel: String,
    pubsub: PubSub,
}

impl Subscription {
    /// Connect to Redis and subscribe to `channel`.
    pub async fn connect(redis_url: &str, channel: &str) -> Result<Self, Error> {
        let client = redis::Client::open(redis_url).map_err(|source| Error {
            source,
            error_kind: ErrorKind::Connect,
        })?;

        let mut pubsub = client.get_async_pubsub().await.map_err(|source| Error {
            source,
            error_kind: ErrorKind::Connect,
        })?;

        pubsub.subscribe(channel).await.map_err(|source| Error {
            source,
            error_kind: ErrorKind::Subscribe,
        })?;

        info!("Subscribed to event channel {channel}");

        Ok(Self {
            channel: channel.to_string(),
            pubsub,
        })
    }

    /// Forward every text payload onto `tx` until the subscription ends or the
    /// receiving side goes away.
    pub async fn forward(self, tx: Sender<String>) {
        let channel = self.channel;
        let mut messages = self.pubsub.into_on_message();

        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping non-text message on {channel}: {e}");
                    continue;
                }
            };

            if tx.send(payload).await.is_err() {
                debug!("Relay stopped receiving, leaving {channel}");
                return;
            }
        }

        error!("Subscription to {channel} ended");
    }
}
