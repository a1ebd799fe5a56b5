// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! framecast streaming server
//!
//! Waits for clients to register over UDP and streams frames to each of them
//! at the configured rate.
//!
//! # Usage
//!
//! ```bash
//! # Test pattern, settings from config/config.json (or defaults)
//! framecast-server
//!
//! # Loop over pre-encoded JPEG frames at 15 fps on port 7000
//! framecast-server --source-dir ./frames --fps 15 --port 7000
//!
//! # Verbose logging to a file
//! framecast-server --log-level debug --log-file server.log
//! ```

use std::fs::OpenOptions;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use framecast::{FrameServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod source;

use source::{FileSequenceSource, FrameSource, TestPatternSource};

/// framecast server - chunked frame streaming over UDP
#[derive(Parser, Debug)]
#[command(name = "framecast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); defaults are used if it does not exist
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// UDP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Chunk payload size in bytes (0 = 1200)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Stream the files in this directory instead of a test pattern
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or a directive list)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_payload_size = chunk_size;
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_names(true)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_file.as_deref())?;

    let mut config = ServerConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    let source = match &args.source_dir {
        Some(dir) => FrameSource::Files(FileSequenceSource::open(dir)?),
        None => FrameSource::Pattern(TestPatternSource::new(config.width, config.height)),
    };

    info!("+----------------------------------------------------+");
    info!(
        "|       framecast server v{}                      |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Listen: {:40} |", config.listen_addr());
    info!("|  Source: {:40} |", source.describe());
    info!("|  Rate:   {:40} |", format!("{} fps", config.fps));
    info!(
        "|  Chunk:  {:40} |",
        format!("{} bytes", config.chunk_payload_size)
    );
    info!(
        "|  Client timeout: {:32} |",
        format!("{}s", config.client_timeout_secs)
    );
    info!("+----------------------------------------------------+");

    let server = FrameServer::bind(config)?;
    let handle = server.start(source)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    info!("Waiting for clients (Ctrl+C to stop)");
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("Shutdown signal received, stopping server...");
    let stats = handle.stats();
    handle.stop();

    info!(
        "Sent {} frames ({} packets, {} bytes) | registered {} | disconnected {} | timed out {} | dropped {}",
        stats.frames_sent,
        stats.packets_sent,
        stats.bytes_sent,
        stats.clients_registered,
        stats.clients_disconnected,
        stats.clients_timed_out,
        stats.clients_dropped
    );
    Ok(())
}
