//! SRTLA Tune - Replay congestion telemetry through the bitrate controller
//!
//! Reads `rtt_ms,packets_in_flight` samples (one per line) from a file or
//! stdin and prints every bitrate decision the adaptive controller makes.
//! Useful for replaying telemetry captured from a live stream against the
//! fast and slow tuning profiles.
//!
//! Examples:
//!   srtla-tune --input telemetry.csv
//!   cat telemetry.csv | srtla-tune --profile slow --target 8000000

use clap::Parser;
use srtla_adaptive::{
    AdaptiveBitrateController, AdaptiveBitrateDelegate, StreamStats, FAST_SETTINGS, SLOW_SETTINGS,
};
use std::io::{self, BufRead, BufReader, Read};

#[derive(Parser, Debug)]
#[command(name = "srtla-tune")]
#[command(about = "Replay telemetry through the adaptive bitrate controller", long_about = None)]
struct Args {
    /// Input file with 'rtt_ms,packets_in_flight' lines, or '-' for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Target bitrate in bits per second
    #[arg(short, long, default_value = "5000000")]
    target: u32,

    /// Tuning profile
    #[arg(short, long, value_enum, default_value = "fast")]
    profile: Profile,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Profile {
    Fast,
    Slow,
}

struct PrintingDelegate {
    changes: u64,
}

impl AdaptiveBitrateDelegate for PrintingDelegate {
    fn set_video_stream_bitrate(&mut self, bitrate: u32) {
        self.changes += 1;
        println!(
            "change {:>5}: bitrate -> {}",
            self.changes,
            format_bitrate(bitrate)
        );
    }
}

/// Encoder bitrates run from the 50 kbps floor to a few Mbps
fn format_bitrate(bps: u32) -> String {
    if bps >= 1_000_000 {
        format!("{:.2} Mbps", f64::from(bps) / 1e6)
    } else {
        format!("{} kbps", bps / 1000)
    }
}

fn parse_line(line: &str) -> Option<StreamStats> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (rtt, pif) = line.split_once(',')?;
    Some(StreamStats {
        rtt_ms: rtt.trim().parse().ok()?,
        packets_in_flight: pif.trim().parse().ok()?,
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let reader: Box<dyn Read> = if args.input == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(std::fs::File::open(&args.input)?)
    };

    let settings = match args.profile {
        Profile::Fast => FAST_SETTINGS,
        Profile::Slow => SLOW_SETTINGS,
    };
    let mut controller =
        AdaptiveBitrateController::new(args.target, Box::new(PrintingDelegate { changes: 0 }));
    controller.set_settings(settings);

    let mut samples = 0u64;
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let Some(stats) = parse_line(&line) else {
            continue;
        };
        samples += 1;
        controller.update(stats);
    }

    println!(
        "Replayed {} samples: bitrate {}, working ceiling {}",
        samples,
        format_bitrate(controller.current_bitrate()),
        format_bitrate(controller.temp_max_bitrate())
    );
    for action in controller.actions_taken() {
        println!("  {}", action);
    }

    Ok(())
}
