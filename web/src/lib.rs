//! HTTP surface of the relay: the `/events` stream, a health check and the
//! static front-end assets.

use log::*;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub use service::AppState;

mod controller;
pub mod error;
pub mod router;
mod sse;

/// Binds the configured address and serves until `shutdown` resolves.
///
/// The shutdown future must close every open event stream, otherwise the
/// server waits on them indefinitely.
pub async fn init_server<F>(app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listen_addr = app_state.config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;

    info!(
        "Server starting... listening for connections on http://{}",
        listener.local_addr()?
    );

    let app = router::define_routes(app_state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
