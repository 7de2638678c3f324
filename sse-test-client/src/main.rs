use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::time::Duration;

mod sse_client;

use sse_client::Connection;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "Event relay testing tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a relay's event stream and print every event received
    Watch {
        /// Base URL of the relay (e.g., http://localhost:8000)
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,

        /// Exit after this many events
        #[arg(long)]
        count: Option<usize>,

        /// Fail if no event arrives within this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Publish one raw message to the relay's inbound channel
    Publish {
        #[arg(long, default_value = "redis://127.0.0.1:6379")]
        redis_url: String,

        #[arg(long, default_value = "gh-events")]
        channel: String,

        /// Raw message text, e.g. '{"type":"WatchEvent","from":"A","to":"B"}'
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    match cli.command {
        Command::Watch {
            base_url,
            count,
            timeout_secs,
        } => watch(&base_url, count, timeout_secs.map(Duration::from_secs)).await,
        Command::Publish {
            redis_url,
            channel,
            message,
        } => publish(&redis_url, &channel, &message).await,
    }
}

async fn watch(base_url: &str, count: Option<usize>, timeout: Option<Duration>) -> Result<()> {
    println!("{} Connecting to {}/events ...", "→".blue(), base_url);
    let mut connection = Connection::establish(base_url)?;

    let mut received = 0;
    while count.map_or(true, |count| received < count) {
        let event = connection.next_event(timeout).await?;
        received += 1;

        println!(
            "{} [{}] {}",
            "✓".green(),
            event.id.as_deref().unwrap_or("-").bright_white(),
            event.data
        );
    }

    println!("\n{}", format!("Received {received} event(s)").bright_green().bold());
    Ok(())
}

async fn publish(redis_url: &str, channel: &str, message: &str) -> Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .with_context(|| format!("Failed to connect to {redis_url}"))?;

    let receivers: i64 = redis::cmd("PUBLISH")
        .arg(channel)
        .arg(message)
        .query_async(&mut conn)
        .await?;

    println!(
        "{} Published to {} ({} subscriber(s))",
        "✓".green(),
        channel,
        receivers
    );
    Ok(())
}
