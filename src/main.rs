//! Chat Hub - Entry Point
//!
//! `serve` runs a hub and turns stdin lines into operator broadcasts.
//! `connect` runs a client and sends stdin lines to the hub. Events go to
//! stdout, logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_hub::{Client, ClientConfig, Dialect, Event, EventReceiver, Hub, HubConfig};

/// Default hub port
const DEFAULT_PORT: u16 = 6000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a hub; each stdin line is broadcast to every client.
    Serve(ServeArgs),
    /// Connect to a hub; each stdin line is sent, `/quit` leaves.
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, value_enum, default_value_t = Dialect::Chat)]
    dialect: Dialect,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// JSON file with hub settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ConnectArgs {
    #[arg(long, value_enum, default_value_t = Dialect::Chat)]
    dialect: Dialect,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name shown to other chat clients
    #[arg(long, default_value = "")]
    nickname: String,

    /// JSON file with client settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_hub=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Connect(args) => connect(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::default(),
    };

    let (hub, events) = Hub::new(args.dialect, config);
    let printer = tokio::spawn(print_events(events, args.json));

    hub.start(args.port).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    hub.broadcast(&line).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    hub.stop().await;
    drop(hub);
    let _ = printer.await;

    Ok(())
}

async fn connect(args: ConnectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let (client, events) = Client::new(args.dialect, config);
    let client = Arc::new(client);
    let printer = tokio::spawn(print_events(events, args.json));

    client.connect(&args.host, args.port, &args.nickname).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if text.eq_ignore_ascii_case("/quit") {
                        break;
                    }
                    if client.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    client.disconnect().await;
    drop(client);
    let _ = printer.await;

    Ok(())
}

/// Print every event until the emitting side is dropped
async fn print_events(mut events: EventReceiver, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        } else {
            match &event {
                Event::Error { .. } => eprintln!("{event}"),
                _ => println!("{event}"),
            }
        }
    }
}
