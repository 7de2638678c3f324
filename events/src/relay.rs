use crate::{decoder, EventHandler};
use log::*;
use tokio::sync::mpsc::Receiver;

/// Counters reported when the relay loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub relayed: u64,
    pub dropped: u64,
}

/// Consume raw messages until the channel closes.
///
/// Each message is decoded and the handler is awaited before the next message
/// is taken, so every handler call observes events in arrival order.
/// Malformed messages are logged and dropped.
pub async fn relay(mut rx: Receiver<String>, handler: &dyn EventHandler) -> RelayStats {
    let mut stats = RelayStats::default();

    while let Some(raw) = rx.recv().await {
        stats.received += 1;

        match decoder::decode(&raw) {
            Ok(event) => {
                handler.handle(&event).await;
                stats.relayed += 1;
            }
            Err(e) => {
                warn!("Dropping inbound message: {e}");
                stats.dropped += 1;
            }
        }
    }

    info!(
        "Inbound channel closed after {} message(s): {} relayed, {} dropped",
        stats.received, stats.relayed, stats.dropped
    );
    stats
}
