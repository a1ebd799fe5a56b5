// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiving client.
//!
//! [`FrameClient::connect`] binds an ephemeral socket, sends `REGISTER_CLIENT`
//! and waits for `REGISTERED`. [`FrameClient::start`] then runs:
//!
//! - a receive thread: datagram -> demux -> [`FrameReassembler`] -> sink.
//!   Frame datagrams from any address other than the server are dropped.
//! - a keepalive thread: `KEEPALIVE` every `keepalive_interval`
//!
//! [`ClientHandle::stop`] joins both and sends `DISCONNECT`.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::demux::{dispatch, DatagramHandler};
use crate::error::TransportError;
use crate::protocol::{self, Chunk, FrameStart, MAX_DATAGRAM_SIZE};
use crate::reassembler::{CompletedFrame, FrameReassembler, ReassemblerStats};
use crate::sink::FrameSink;
use crate::socket::{bind_udp, recv_polled, sleep_while_running};

/// Receiver statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    /// Datagrams received from any source.
    pub datagrams_received: u64,
    /// Datagrams that failed to parse.
    pub datagrams_dropped: u64,
    /// Frame datagrams from an address other than the server.
    pub datagrams_foreign: u64,
    /// Frames handed to the sink.
    pub frames_received: u64,
    /// Payload bytes of delivered frames.
    pub bytes_received: u64,
    /// Keepalives sent.
    pub keepalives_sent: u64,
}

#[derive(Default)]
struct ClientCounters {
    datagrams_received: AtomicU64,
    datagrams_dropped: AtomicU64,
    datagrams_foreign: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    keepalives_sent: AtomicU64,
}

impl ClientCounters {
    fn snapshot(&self) -> ClientStats {
        ClientStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            datagrams_foreign: self.datagrams_foreign.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
        }
    }
}

/// Client registered with a server, not yet receiving.
pub struct FrameClient {
    config: ClientConfig,
    socket: Arc<UdpSocket>,
}

impl FrameClient {
    /// Bind, register with `config.server` and wait for the acknowledgement.
    ///
    /// Datagrams other than `REGISTERED` that arrive meanwhile are discarded.
    pub fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        config.validate()?;

        let addr = config.bind_addr();
        let socket = bind_udp(addr, config.poll_timeout(), config.recv_buffer_size)
            .map_err(|source| TransportError::Bind { addr, source })?;

        register(&socket, config.server, config.register_timeout())?;
        log::info!(
            "[client] registered with {} from {}",
            config.server,
            socket.local_addr()?
        );

        Ok(Self {
            config,
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.config.server
    }

    /// Spawn the receive and keepalive threads. Every completed frame goes to
    /// `sink`, called outside the reassembler lock.
    pub fn start<S>(self, sink: S) -> Result<ClientHandle, TransportError>
    where
        S: FrameSink + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let reassembler = Arc::new(Mutex::new(FrameReassembler::new(
            self.config.reassembler(),
        )));
        let counters = Arc::new(ClientCounters::default());

        let mut handle = ClientHandle {
            socket: Arc::clone(&self.socket),
            server: self.config.server,
            running: Arc::clone(&running),
            threads: Vec::with_capacity(2),
            reassembler: Arc::clone(&reassembler),
            counters: Arc::clone(&counters),
            stopped: false,
        };

        let receiver = Receiver {
            socket: Arc::clone(&self.socket),
            server: self.config.server,
            reassembler,
            counters: Arc::clone(&counters),
        };
        let flag = Arc::clone(&running);
        handle.threads.push(
            thread::Builder::new()
                .name("framecast-receiver".into())
                .spawn(move || receiver.run(sink, &flag))?,
        );

        let socket = Arc::clone(&self.socket);
        let server = self.config.server;
        let interval = self.config.keepalive_interval();
        handle.threads.push(
            thread::Builder::new()
                .name("framecast-keepalive".into())
                .spawn(move || run_keepalive(&socket, server, interval, &counters, &running))?,
        );

        Ok(handle)
    }
}

/// Send `REGISTER_CLIENT` and wait for `REGISTERED` from `server`.
fn register(socket: &UdpSocket, server: SocketAddr, timeout: Duration) -> Result<(), TransportError> {
    struct AwaitAck {
        server: SocketAddr,
        acked: bool,
    }

    impl DatagramHandler for AwaitAck {
        fn on_registered(&mut self, source: SocketAddr) {
            if source == self.server {
                self.acked = true;
            } else {
                log::debug!("[client] ignoring REGISTERED from {}", source);
            }
        }
    }

    socket.send_to(protocol::REGISTER_CLIENT, server)?;
    log::debug!("[client] sent REGISTER_CLIENT to {}", server);

    let deadline = Instant::now() + timeout;
    let mut handler = AwaitAck {
        server,
        acked: false,
    };
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    while Instant::now() < deadline {
        if let Some((n, source)) = recv_polled(socket, &mut buf, "client") {
            dispatch(&buf[..n], source, &mut handler);
            if handler.acked {
                return Ok(());
            }
        }
    }

    Err(TransportError::RegistrationTimeout(server))
}

/// Running client. Dropping the handle stops it.
pub struct ClientHandle {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    reassembler: Arc<Mutex<FrameReassembler>>,
    counters: Arc<ClientCounters>,
    stopped: bool,
}

impl ClientHandle {
    /// Stop both threads and tell the server to forget this client.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.reassembler.lock().stats()
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.running.store(false, Ordering::SeqCst);

        for thread in self.threads.drain(..) {
            let name = thread.thread().name().unwrap_or("?").to_string();
            if thread.join().is_err() {
                log::error!("[client] thread {} panicked", name);
            }
        }

        match self.socket.send_to(protocol::DISCONNECT, self.server) {
            Ok(_) => log::info!("[client] disconnected from {}", self.server),
            Err(e) => log::warn!("[client] failed to send DISCONNECT to {}: {}", self.server, e),
        }
        self.reassembler.lock().clear();
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Receive loop
// ============================================================================

struct Receiver {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    reassembler: Arc<Mutex<FrameReassembler>>,
    counters: Arc<ClientCounters>,
}

impl Receiver {
    fn run<S: FrameSink>(self, mut sink: S, running: &AtomicBool) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut handler = FrameHandler::new(self.server, &self.reassembler);

        while running.load(Ordering::SeqCst) {
            let Some((n, source)) = recv_polled(&self.socket, &mut buf, "client") else {
                continue;
            };
            self.counters
                .datagrams_received
                .fetch_add(1, Ordering::Relaxed);

            dispatch(&buf[..n], source, &mut handler);

            if std::mem::take(&mut handler.dropped) {
                self.counters
                    .datagrams_dropped
                    .fetch_add(1, Ordering::Relaxed);
            }
            if std::mem::take(&mut handler.foreign) {
                self.counters
                    .datagrams_foreign
                    .fetch_add(1, Ordering::Relaxed);
            }
            if let Some(frame) = handler.completed.take() {
                self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_received
                    .fetch_add(frame.payload.len() as u64, Ordering::Relaxed);
                sink.accept(frame.frame_id, frame.payload);
            }
        }
        log::debug!("[client] receiver stopped");
    }
}

/// Feeds the server's frame datagrams to the reassembler; control datagrams
/// are ignored.
struct FrameHandler<'a> {
    server: SocketAddr,
    reassembler: &'a Mutex<FrameReassembler>,
    completed: Option<CompletedFrame>,
    dropped: bool,
    foreign: bool,
}

impl<'a> FrameHandler<'a> {
    fn new(server: SocketAddr, reassembler: &'a Mutex<FrameReassembler>) -> Self {
        Self {
            server,
            reassembler,
            completed: None,
            dropped: false,
            foreign: false,
        }
    }

    fn from_server(&mut self, source: SocketAddr) -> bool {
        if source == self.server {
            return true;
        }
        log::trace!("[client] frame datagram from foreign {} dropped", source);
        self.foreign = true;
        false
    }
}

impl DatagramHandler for FrameHandler<'_> {
    fn on_frame_start(&mut self, source: SocketAddr, start: FrameStart) {
        if self.from_server(source) {
            self.completed = self.reassembler.lock().on_frame_start(start);
        }
    }

    fn on_chunk(&mut self, source: SocketAddr, chunk: Chunk<'_>) {
        if self.from_server(source) {
            self.completed = self.reassembler.lock().on_chunk(chunk);
        }
    }

    fn on_dropped(&mut self, _source: SocketAddr) {
        self.dropped = true;
    }
}

// ============================================================================
// Keepalive loop
// ============================================================================

fn run_keepalive(
    socket: &UdpSocket,
    server: SocketAddr,
    interval: Duration,
    counters: &ClientCounters,
    running: &AtomicBool,
) {
    while sleep_while_running(interval, running) {
        match socket.send_to(protocol::KEEPALIVE, server) {
            Ok(_) => {
                counters.keepalives_sent.fetch_add(1, Ordering::Relaxed);
                log::trace!("[client] keepalive sent to {}", server);
            }
            Err(e) => log::warn!("[client] keepalive to {} failed: {}", server, e),
        }
    }
    log::debug!("[client] keepalive stopped");
}
