// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! framecast-client - reference receiver
//!
//! Registers with a framecast server, reassembles incoming frames and reports
//! the received frame rate once per second. Frames can be written to disk for
//! inspection. Ctrl+C sends DISCONNECT and exits.
//!
//! ```bash
//! framecast-client 192.168.1.20:9999
//! framecast-client 127.0.0.1:9999 --output-dir ./received --ext jpg
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam::channel::{self, RecvTimeoutError};
use framecast::{ClientConfig, CompletedFrame, FrameClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "framecast-client")]
#[command(about = "Receive and reassemble frames from a framecast server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(default_value = "127.0.0.1:9999")]
    server: SocketAddr,

    /// Local bind address (default: any interface, ephemeral port)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Chunk payload size the server uses (0 = 1200)
    #[arg(long, default_value = "1200")]
    chunk_size: usize,

    /// Seconds between keepalives
    #[arg(long, default_value = "15")]
    keepalive: u64,

    /// Write each completed frame into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File extension for written frames
    #[arg(long, default_value = "bin")]
    ext: String,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Frames-per-second over a sliding one-second window.
struct RateMeter {
    window_start: Instant,
    frames: u64,
    bytes: u64,
}

impl RateMeter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            bytes: 0,
        }
    }

    /// Record a frame; returns `(fps, kbytes_per_sec)` once a window closes.
    fn record(&mut self, bytes: usize) -> Option<(f64, f64)> {
        self.frames += 1;
        self.bytes += bytes as u64;
        self.poll()
    }

    fn poll(&mut self) -> Option<(f64, f64)> {
        let elapsed = self.window_start.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        let rates = (self.frames as f64 / secs, self.bytes as f64 / 1024.0 / secs);
        self.window_start = Instant::now();
        self.frames = 0;
        self.bytes = 0;
        Some(rates)
    }
}

fn write_frame(dir: &Path, ext: &str, frame: &CompletedFrame) -> std::io::Result<()> {
    let path = dir.join(format!("frame_{:08}.{}", frame.frame_id, ext));
    fs::write(path, &frame.payload)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)?;
    }

    let config = ClientConfig {
        bind: args.bind,
        chunk_payload_size: args.chunk_size,
        keepalive_interval_secs: args.keepalive,
        poll_timeout_ms: 200,
        ..ClientConfig::new(args.server)
    };

    info!("Connecting to {}...", args.server);
    let client = FrameClient::connect(config)?;
    info!("Registered from {}", client.local_addr()?);

    let (tx, rx) = channel::bounded::<CompletedFrame>(64);
    let handle = client.start(tx)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut meter = RateMeter::new();
    let mut total = 0u64;

    while running.load(Ordering::SeqCst) {
        let rates = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                total += 1;
                if let Some(dir) = &args.output_dir {
                    if let Err(e) = write_frame(dir, &args.ext, &frame) {
                        warn!("Failed to write frame {}: {}", frame.frame_id, e);
                    }
                }
                meter.record(frame.payload.len())
            }
            Err(RecvTimeoutError::Timeout) => meter.poll(),
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some((fps, kbps)) = rates {
            let stats = handle.reassembler_stats();
            info!(
                "FPS: {:.1} | {:.0} KB/s | frames: {} | pending: {} | evicted: {}",
                fps, kbps, total, stats.pending_frames, stats.frames_evicted
            );
        }
    }

    info!("Stopping...");
    let stats = handle.stats();
    let reassembly = handle.reassembler_stats();
    handle.stop();

    info!(
        "Received {} frames ({} bytes) from {} datagrams | dropped datagrams: {} | foreign: {} | incomplete frames evicted: {}",
        stats.frames_received,
        stats.bytes_received,
        stats.datagrams_received,
        stats.datagrams_dropped,
        stats.datagrams_foreign,
        reassembly.frames_evicted
    );
    Ok(())
}
