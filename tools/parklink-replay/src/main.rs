//! Offline decoder for captured parking-sensor device output.
//!
//! Replays a capture file through the bridge's framer, classifier, and
//! reducers, printing each decoded message and the state transitions it
//! produced. Useful for inspecting field captures without hardware
//! attached.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use parklink_bridge::device_link::{
    AlignmentSeverity, DataSnapshot, DeviceMessage, LineFramer, LinkEvent, SessionState, SlotMode,
    classify_chunk, classify_line,
};

/// Replay a parking-sensor capture through the device-link reducers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the capture file (raw serial text, or JSON lines with --poll)
    input: PathBuf,

    /// Treat the capture as one JSON poll body per line (HTTP transport)
    #[arg(short = 'p', long)]
    poll: bool,

    /// Feed serial captures in chunks of this many bytes to exercise
    /// framing across arbitrary boundaries
    #[arg(short = 'c', long, default_value_t = 64)]
    chunk_size: usize,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("parklink_replay=debug".parse()?),
            )
            .init();
    }

    if args.no_color || args.output.is_some() {
        colored::control::set_override(false);
    }

    let capture = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to open capture file: {:?}", args.input))?;

    let lines = if args.poll {
        replay_poll(&capture)
    } else {
        replay_serial(&capture, args.chunk_size.max(1))
    };

    if let Some(output_path) = args.output {
        fs::write(&output_path, lines.join("\n") + "\n")
            .with_context(|| format!("Failed to write output file: {:?}", output_path))?;
    } else {
        for line in lines {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Replay a raw serial capture, chunked to exercise the framer.
fn replay_serial(capture: &str, chunk_size: usize) -> Vec<String> {
    let mut framer = LineFramer::new();
    let mut session = SessionState::new();
    let mut out = Vec::new();

    for chunk in capture.as_bytes().chunks(chunk_size) {
        let chunk = String::from_utf8_lossy(chunk);
        let lines = framer.feed(&chunk);

        for line in &lines {
            if !line.trim().is_empty() && classify_line(line).is_none() {
                out.push(format!("{} {}", "ignored".dimmed(), line));
            }
        }

        for msg in classify_chunk(&lines) {
            out.push(format_message(&msg));
            for event in session.apply(&msg, SlotMode::Event) {
                out.push(format_event(&event));
            }
        }
    }

    if !framer.pending().is_empty() {
        out.push(format!(
            "{} trailing partial line: {:?}",
            "note".dimmed(),
            framer.pending()
        ));
    }
    out
}

/// Replay a JSON-lines capture of HTTP poll bodies.
fn replay_poll(capture: &str) -> Vec<String> {
    let mut session = SessionState::new();
    let mut last_slots: Option<u8> = None;
    let mut out = Vec::new();

    for (index, line) in capture.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let snapshot: DataSnapshot = match serde_json::from_str(line) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // A live session treats this as connection loss; so does
                // the replay.
                out.push(format!(
                    "{} poll {}: {} (session would end here)",
                    "connection lost".red(),
                    index + 1,
                    e
                ));
                break;
            }
        };

        for msg in snapshot.messages(last_slots) {
            out.push(format_message(&msg));
            for event in session.apply(&msg, SlotMode::Snapshot) {
                out.push(format_event(&event));
            }
        }
        if let Some(n) = snapshot.slots {
            last_slots = Some(n);
        }
    }
    out
}

fn format_message(msg: &DeviceMessage) -> String {
    match msg {
        DeviceMessage::Alignment(token) => format!("ALIGNMENT {}", token),
        DeviceMessage::SlotCount(n) => format!("SLOTS {}", n),
        DeviceMessage::SlotOccupied(id) => format!("OCCUPIED {}", id),
        DeviceMessage::SlotReleased(id) => format!("RELEASED {}", id),
    }
}

fn format_event(event: &LinkEvent) -> String {
    match event {
        LinkEvent::AlignmentChanged(status) => {
            let text = status.to_string();
            let text = match status.severity() {
                AlignmentSeverity::Ok => text.green(),
                AlignmentSeverity::Warning => text.yellow(),
                AlignmentSeverity::Neutral => text.normal(),
            };
            format!("  alignment -> {}", text)
        }
        LinkEvent::SlotsUpdated(snapshot) => format!(
            "  slots -> {} available, occupied {:?}",
            snapshot.available_count, snapshot.occupied
        ),
        LinkEvent::NotificationRaised(kind) => {
            format!("  {} {}", kind.title().red().bold(), kind.message())
        }
        LinkEvent::NotificationCleared => "  notification cleared".to_string(),
        other => format!("  {:?}", other),
    }
}
