//! courier-live - Main Entry Point
//!
//! Watches one courier push endpoint and prints every channel event as a JSON
//! line on stdout. Logs go to stderr.

use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use courier_live::auth::{provider_from_config, CredentialProvider, StaticCredentials};
use courier_live::channel::{handler, ChannelEvent, EventName, LiveChannel};
use courier_live::config::{LiveConfig, CONFIG_SEARCH_PATHS};
use courier_live::observability::{init_default_logging, init_logging, LogFormat};
use courier_live::protocol::{Endpoint, OutboundMessage};
use courier_live::transport::WsConnector;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Interval};
use tracing::{error, info, warn, Instrument, Level};

/// Live update channel client for the courier platform
#[derive(Parser)]
#[command(name = "courier-live")]
#[command(about = "Reconnecting client for courier server-push channels")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to an endpoint and print its events until Ctrl-C
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["endpoint", "tracking", "notifications", "driver", "admin"])
    ))]
    Watch {
        /// Raw endpoint path, e.g. /ws/notifications/
        #[arg(long)]
        endpoint: Option<String>,
        /// Package tracking stream for this tracking number
        #[arg(long, value_name = "NUMBER")]
        tracking: Option<String>,
        /// Notifications for the authenticated user
        #[arg(long)]
        notifications: bool,
        /// Driver route updates
        #[arg(long)]
        driver: bool,
        /// Admin dashboard updates
        #[arg(long)]
        admin: bool,
        /// Bearer token; overrides the [auth] section
        #[arg(long, env = "SWIFTCOURIER_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Send a ping every N seconds while connected
        #[arg(long, value_name = "SECS")]
        ping_interval: Option<u64>,
        /// Ask for a fresh snapshot after every (re)connect
        #[arg(long)]
        request_update: bool,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

struct WatchOptions {
    endpoint: Endpoint,
    token: Option<String>,
    ping_interval: Option<u64>,
    request_update: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    info!("Starting courier-live v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Watch {
            endpoint,
            tracking,
            notifications,
            driver,
            admin,
            token,
            ping_interval,
            request_update,
        } => match resolve_endpoint(endpoint, tracking, notifications, driver, admin) {
            Ok(endpoint) => {
                let span = courier_live::channel_span!(endpoint = %endpoint);
                watch(
                    config,
                    WatchOptions {
                        endpoint,
                        token,
                        ping_interval,
                        request_update,
                    },
                )
                .instrument(span)
                .await
            }
            Err(e) => Err(e),
        },
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn init_cli_logging(verbose: u8) {
    match verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
            init_logging(level, LogFormat::parse(&format), false);
        }
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<LiveConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(LiveConfig::load_from_file(path)?)
        }
        None => {
            for path_str in CONFIG_SEARCH_PATHS {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(LiveConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults and environment");
            Ok(LiveConfig::from_env()?)
        }
    }
}

fn resolve_endpoint(
    endpoint: Option<String>,
    tracking: Option<String>,
    notifications: bool,
    driver: bool,
    admin: bool,
) -> Result<Endpoint, Box<dyn std::error::Error>> {
    if let Some(path) = endpoint {
        return Ok(Endpoint::custom(&path)?);
    }
    if let Some(number) = tracking {
        return Ok(Endpoint::tracking(&number)?);
    }
    if notifications {
        return Ok(Endpoint::notifications());
    }
    if driver {
        return Ok(Endpoint::driver_updates());
    }
    if admin {
        return Ok(Endpoint::admin_updates());
    }
    Err("No endpoint selected".into())
}

async fn watch(config: LiveConfig, options: WatchOptions) -> Result<(), Box<dyn std::error::Error>> {
    let credentials: Arc<dyn CredentialProvider> = match options.token {
        Some(token) => Arc::new(StaticCredentials::new(token)),
        None => provider_from_config(&config.auth),
    };
    let channel = LiveChannel::new(
        config.channel_config()?,
        Arc::new(WsConnector::new()),
        credentials,
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    for name in [
        EventName::Connected,
        EventName::Disconnected,
        EventName::Error,
        EventName::Message,
        EventName::ReconnectFailed,
    ] {
        let tx = events_tx.clone();
        channel.on(
            name,
            handler(move |event| {
                let _ = tx.send(event.clone());
            }),
        );
    }
    drop(events_tx);

    info!("Watching {}", options.endpoint);
    channel.connect(&options.endpoint);

    let mut ping = options
        .ping_interval
        .filter(|secs| *secs > 0)
        .map(|secs| interval(Duration::from_secs(secs)));

    let mut gave_up = false;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C, disconnecting...");
                break;
            }
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event)?;
                match event {
                    ChannelEvent::Connected { .. } if options.request_update => {
                        channel.send(&OutboundMessage::RequestUpdate);
                    }
                    ChannelEvent::ReconnectFailed { attempts } => {
                        error!(attempts, "Giving up on {}", options.endpoint);
                        gave_up = true;
                        break;
                    }
                    _ => {}
                }
            }
            _ = next_tick(&mut ping) => {
                if channel.is_connected() {
                    channel.send(&OutboundMessage::Ping);
                }
            }
        }
    }

    channel.disconnect();
    drain_until_disconnected(&mut events_rx).await?;

    if gave_up {
        return Err(format!("Reconnection to {} failed", options.endpoint).into());
    }
    Ok(())
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Print events still in flight until the closing `disconnected`
async fn drain_until_disconnected(
    events_rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = events_rx.recv().await {
            print_event(&event)?;
            if matches!(event, ChannelEvent::Disconnected { .. }) {
                break;
            }
        }
        Ok::<(), serde_json::Error>(())
    })
    .await;

    match drained {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!("Timed out waiting for the channel to close");
            Ok(())
        }
    }
}

fn print_event(event: &ChannelEvent) -> Result<(), serde_json::Error> {
    let mut line = event_json(event);
    line["received_at"] = json!(Utc::now().to_rfc3339());
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn event_json(event: &ChannelEvent) -> Value {
    match event {
        ChannelEvent::Connected { endpoint } => json!({
            "event": "connected",
            "endpoint": endpoint,
        }),
        ChannelEvent::Disconnected {
            code,
            reason,
            intentional,
        } => json!({
            "event": "disconnected",
            "code": code,
            "reason": reason,
            "intentional": intentional,
        }),
        ChannelEvent::Error { message } => json!({
            "event": "error",
            "message": message,
        }),
        ChannelEvent::Message(message) => json!({
            "event": "message",
            "type": message.kind.as_ref().map(|kind| kind.as_str()),
            "payload": message.payload,
        }),
        ChannelEvent::ReconnectFailed { attempts } => json!({
            "event": "reconnect_failed",
            "attempts": attempts,
        }),
    }
}

fn handle_config_command(config: LiveConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    let channel_config = config.channel_config()?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        println!("# derived WebSocket base: {}", channel_config.ws_base_url);
    }

    info!("Configuration validation complete");
    Ok(())
}
