use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the pub/sub channel the upstream producer publishes events to.
pub const DEFAULT_EVENT_CHANNEL: &str = "gh-events";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub interface: String,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 8000)]
    pub port: u16,

    /// Redis URL of the message queue that publishes inbound events
    #[arg(short, long, env, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Pub/sub channel to subscribe to for inbound events
    #[arg(short, long, env, default_value = DEFAULT_EVENT_CHANNEL)]
    pub event_channel: String,

    /// Directory of static assets served alongside the event stream
    #[arg(short, long, env, default_value = "./public")]
    pub static_dir: PathBuf,

    /// Milliseconds a write may wait on a slow client before it is disconnected
    #[arg(long, env, default_value_t = 2000)]
    pub write_timeout_ms: u64,

    /// Number of events buffered per client connection
    #[arg(long, env, default_value_t = 32)]
    pub connection_buffer: usize,

    /// Seconds between keep-alive comments on idle event streams
    #[arg(long, env, default_value_t = 15)]
    pub keep_alive_secs: u64,

    /// Number of raw inbound messages buffered between the subscription and the relay
    #[arg(long, env, default_value_t = 1024)]
    pub inbound_buffer: usize,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.interface, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}
