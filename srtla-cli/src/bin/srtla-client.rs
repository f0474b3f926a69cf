//! SRTLA Client - Bonded upload endpoint for a local SRT client
//!
//! Starts a bonding session toward an SRTLA server and prints the loopback
//! port a local SRT client should stream to. Cellular and Wi-Fi links ride
//! the default route; wired Ethernet links come and go with the interfaces
//! pushed via path updates.
//!
//! Examples:
//!   srtla-client --uri srtla://ingest.example.com:5000
//!   srtla-client --uri srt://ingest.example.com:5000 --passthrough
//!   srtla-client --config client.toml

use clap::Parser;
use srtla_bonding::{
    BondingSession, BondingSessionDelegate, ConnectionPriorities, SessionError,
};
use srtla_cli::config::Config;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "srtla-client")]
#[command(about = "Bonded SRTLA upload client", long_about = None)]
struct Args {
    /// Destination, e.g. 'srtla://host:port' or 'srt://host:port'
    #[arg(short, long)]
    uri: Option<String>,

    /// Use a single direct SRT link instead of bonding
    #[arg(long)]
    passthrough: bool,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Statistics interval in seconds (0 disables)
    #[arg(long, default_value = "2")]
    stats: u64,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

enum SessionNotification {
    Ready(u16),
    Error(SessionError),
}

struct ChannelDelegate {
    tx: Mutex<mpsc::Sender<SessionNotification>>,
}

impl BondingSessionDelegate for ChannelDelegate {
    fn srtla_ready(&self, port: u16) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(SessionNotification::Ready(port));
        }
    }

    fn srtla_error(&self, error: SessionError) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(SessionNotification::Error(error));
        }
    }
}

/// Uptime as a wall clock, e.g. `01:23:45`
fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Byte count scaled to the largest binary unit that keeps it readable
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?.client,
        None => None,
    };

    let uri = args
        .uri
        .clone()
        .or_else(|| config.as_ref().map(|c| c.uri.clone()))
        .ok_or_else(|| anyhow::anyhow!("A destination URI is required (use --uri or --config)"))?;
    let passthrough = args.passthrough || config.as_ref().is_some_and(|c| c.passthrough);
    let timeout = config
        .as_ref()
        .map(|c| c.timeout())
        .unwrap_or(Duration::from_secs(args.timeout));
    let stats_interval = config
        .as_ref()
        .map(|c| c.stats_interval())
        .unwrap_or(Duration::from_secs(args.stats));
    let priorities = config
        .as_ref()
        .map(|c| c.connection_priorities())
        .unwrap_or_else(ConnectionPriorities::default);

    tracing::info!("SRTLA client starting...");
    tracing::info!("Destination: {}", uri);

    let (tx, rx) = mpsc::channel();
    let session = BondingSession::new(
        Arc::new(ChannelDelegate { tx: Mutex::new(tx) }),
        passthrough,
        priorities,
    );
    session.start(&uri, timeout);

    let port = match rx.recv_timeout(timeout + Duration::from_secs(1)) {
        Ok(SessionNotification::Ready(port)) => port,
        Ok(SessionNotification::Error(error)) => {
            anyhow::bail!("Session failed: {}", error);
        }
        Err(_) => anyhow::bail!("Session did not come up"),
    };

    println!("Bonded transport ready.");
    println!("Point your SRT client at srt://127.0.0.1:{}", port);

    let start_time = Instant::now();
    loop {
        if stats_interval.is_zero() {
            // nothing to print, just wait for failure
            match rx.recv() {
                Ok(SessionNotification::Error(error)) => anyhow::bail!("Session failed: {}", error),
                Ok(SessionNotification::Ready(_)) => continue,
                Err(_) => return Ok(()),
            }
        }
        match rx.recv_timeout(stats_interval) {
            Ok(SessionNotification::Error(error)) => {
                anyhow::bail!("Session failed: {}", error);
            }
            Ok(SessionNotification::Ready(_)) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let breakdown = session
                    .connection_statistics()
                    .unwrap_or_else(|| "no traffic".to_string());
                tracing::info!(
                    "[{}] {} total | {}",
                    format_uptime(start_time.elapsed()),
                    format_bytes(session.total_byte_count()),
                    breakdown
                );
                session.log_statistics();
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}
