use events::source::Subscription;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use sse::{Manager, SseRelayHandler};
use std::process;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        process::exit(1);
    }

    info!("Starting cartographer event relay v{}", env!("CARGO_PKG_VERSION"));

    let subscription =
        match Subscription::connect(config.redis_url(), &config.event_channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        };

    let sse_manager = Arc::new(service::init_sse_manager(&config));
    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_buffer);
    let (relay_done_tx, relay_done_rx) = oneshot::channel();

    tokio::spawn(subscription.forward(inbound_tx));

    let handler = SseRelayHandler::new(sse_manager.clone());
    tokio::spawn(async move {
        events::relay(inbound_rx, &handler).await;
        let _ = relay_done_tx.send(());
    });

    let app_state = AppState::new(config, &sse_manager);
    let shutdown = shutdown_signal(sse_manager, relay_done_rx);

    if let Err(e) = web::init_server(app_state, shutdown).await {
        error!("Server failed: {e}");
        process::exit(1);
    }

    info!("Server stopped");
}

/// Resolves on Ctrl-C or when the inbound relay stops, then closes every open
/// event stream so the server can finish.
async fn shutdown_signal(sse_manager: Arc<Manager>, relay_done: oneshot::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        }
        _ = relay_done => {
            error!("Inbound event source closed, shutting down");
        }
    }

    sse_manager.close_all();
}
