use config::Config;
use log::info;
use sse::manager::Settings;
use sse::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the SSE manager with the per-connection limits from config.
pub fn init_sse_manager(config: &Config) -> Manager {
    let settings = Settings {
        write_timeout: config.write_timeout(),
        connection_buffer: config.connection_buffer,
    };

    info!(
        "SSE config: write_timeout={}ms, connection_buffer={}, keep_alive={}s",
        config.write_timeout_ms, settings.connection_buffer, config.keep_alive_secs,
    );

    Manager::new(settings)
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub sse_manager: Arc<Manager>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, sse_manager: &Arc<Manager>) -> Self {
        Self {
            sse_manager: Arc::clone(sse_manager),
            config: app_config,
        }
    }
}
