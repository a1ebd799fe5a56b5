// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming server (sender side).
//!
//! Three threads share one UDP socket, the [`SessionRegistry`] and a running
//! flag, and nothing else:
//!
//! ```text
//! framecast-listener   recv (poll timeout) -> REGISTER_CLIENT / KEEPALIVE / DISCONNECT
//! framecast-streamer   source -> packetize -> send to every session, sleep 1/fps if paced
//! framecast-sweeper    every sweep_interval, drop sessions idle > client_timeout
//! ```
//!
//! The streamer sends to a snapshot of the session set. Peers whose send
//! fails are removed only after the whole fan-out pass, so one dead peer never
//! holds up the others.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::demux::{dispatch, DatagramHandler};
use crate::error::{SourceError, TransportError};
use crate::packetizer::packetize;
use crate::protocol::FrameId;
use crate::registry::SessionRegistry;
use crate::socket::{bind_udp, recv_polled, sleep_while_running};
use crate::source::PayloadSource;

/// Control datagrams are tiny; anything longer is truncated and still
/// classified by its prefix.
const CONTROL_BUFFER_SIZE: usize = 2048;

/// How long the streamer waits when the source has nothing ready.
const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Sender statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderStats {
    /// Frames fanned out (counted once regardless of client count).
    pub frames_sent: u64,
    /// Datagrams sent successfully.
    pub packets_sent: u64,
    /// Bytes sent successfully.
    pub bytes_sent: u64,
    /// Failed sends.
    pub send_errors: u64,
    /// New sessions created.
    pub clients_registered: u64,
    /// Sessions removed by DISCONNECT.
    pub clients_disconnected: u64,
    /// Sessions removed by the sweeper.
    pub clients_timed_out: u64,
    /// Sessions removed after a failed send.
    pub clients_dropped: u64,
}

#[derive(Default)]
struct SenderCounters {
    frames_sent: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_errors: AtomicU64,
    clients_registered: AtomicU64,
    clients_disconnected: AtomicU64,
    clients_timed_out: AtomicU64,
    clients_dropped: AtomicU64,
}

impl SenderCounters {
    fn snapshot(&self) -> SenderStats {
        SenderStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            clients_registered: self.clients_registered.load(Ordering::Relaxed),
            clients_disconnected: self.clients_disconnected.load(Ordering::Relaxed),
            clients_timed_out: self.clients_timed_out.load(Ordering::Relaxed),
            clients_dropped: self.clients_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Bound streaming server, not yet running.
pub struct FrameServer {
    config: Arc<ServerConfig>,
    socket: Arc<UdpSocket>,
    registry: Arc<SessionRegistry>,
    counters: Arc<SenderCounters>,
    running: Arc<AtomicBool>,
}

impl FrameServer {
    /// Validate `config` and bind the server socket.
    pub fn bind(config: ServerConfig) -> Result<Self, TransportError> {
        config.validate()?;

        let addr = config.listen_addr();
        let socket = bind_udp(addr, config.poll_timeout(), config.recv_buffer_size)
            .map_err(|source| TransportError::Bind { addr, source })?;

        log::info!("[server] listening on {}", socket.local_addr()?);

        Ok(Self {
            config: Arc::new(config),
            socket: Arc::new(socket),
            registry: Arc::new(SessionRegistry::new()),
            counters: Arc::new(SenderCounters::default()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> SenderStats {
        self.counters.snapshot()
    }

    /// Spawn the listener, streamer and sweeper threads.
    pub fn start<S>(&self, source: S) -> Result<ServerHandle, TransportError>
    where
        S: PayloadSource + 'static,
    {
        let local_addr = self.socket.local_addr()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }

        let mut handle = ServerHandle {
            running: Arc::clone(&self.running),
            threads: Vec::with_capacity(3),
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
            local_addr,
        };

        // On a spawn failure, dropping `handle` stops the threads already started
        let listener = Listener {
            socket: Arc::clone(&self.socket),
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
        };
        let running = Arc::clone(&self.running);
        handle.threads.push(
            thread::Builder::new()
                .name("framecast-listener".into())
                .spawn(move || listener.run(&running))?,
        );

        let streamer = Streamer {
            socket: Arc::clone(&self.socket),
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
            config: Arc::clone(&self.config),
        };
        let running = Arc::clone(&self.running);
        handle.threads.push(
            thread::Builder::new()
                .name("framecast-streamer".into())
                .spawn(move || streamer.run(source, &running))?,
        );

        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(&self.counters);
        let config = Arc::clone(&self.config);
        let running = Arc::clone(&self.running);
        handle.threads.push(
            thread::Builder::new()
                .name("framecast-sweeper".into())
                .spawn(move || run_sweeper(&registry, &counters, &config, &running))?,
        );

        Ok(handle)
    }
}

/// Running server. Dropping the handle stops it.
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    registry: Arc<SessionRegistry>,
    counters: Arc<SenderCounters>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Clear the running flag and wait for all threads to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> SenderStats {
        self.counters.snapshot()
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for thread in self.threads.drain(..) {
            let name = thread.thread().name().unwrap_or("?").to_string();
            if thread.join().is_err() {
                log::error!("[server] thread {} panicked", name);
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Listener
// ============================================================================

struct Listener {
    socket: Arc<UdpSocket>,
    registry: Arc<SessionRegistry>,
    counters: Arc<SenderCounters>,
}

impl Listener {
    fn run(self, running: &AtomicBool) {
        let mut buf = vec![0u8; CONTROL_BUFFER_SIZE];
        let mut handler = ControlHandler {
            socket: &self.socket,
            registry: &self.registry,
            counters: &self.counters,
        };

        while running.load(Ordering::SeqCst) {
            if let Some((n, source)) = recv_polled(&self.socket, &mut buf, "server") {
                dispatch(&buf[..n], source, &mut handler);
            }
        }
        log::debug!("[server] listener stopped");
    }
}

/// Applies control datagrams to the registry.
struct ControlHandler<'a> {
    socket: &'a UdpSocket,
    registry: &'a SessionRegistry,
    counters: &'a SenderCounters,
}

impl DatagramHandler for ControlHandler<'_> {
    fn on_register(&mut self, source: SocketAddr) {
        let ack = self.registry.register(source, Instant::now());
        if ack.new_session {
            self.counters
                .clients_registered
                .fetch_add(1, Ordering::Relaxed);
            log::info!(
                "[server] client registered: {} (frames go to this exact address)",
                ack.endpoint
            );
        } else {
            log::debug!("[server] client re-registered: {}", ack.endpoint);
        }

        if let Err(e) = self.socket.send_to(ack.payload(), ack.endpoint) {
            log::warn!("[server] failed to acknowledge {}: {}", ack.endpoint, e);
        }
    }

    fn on_keepalive(&mut self, source: SocketAddr) {
        match self.registry.keepalive(source.ip(), Instant::now()) {
            Some(endpoint) => log::trace!("[server] keepalive from {} for {}", source, endpoint),
            None => log::debug!("[server] keepalive from unregistered {}", source),
        }
    }

    fn on_disconnect(&mut self, source: SocketAddr) {
        if let Some(session) = self.registry.disconnect(source.ip()) {
            self.counters
                .clients_disconnected
                .fetch_add(1, Ordering::Relaxed);
            log::info!("[server] client disconnected: {}", session.endpoint);
        }
    }
}

// ============================================================================
// Streamer
// ============================================================================

struct Streamer {
    socket: Arc<UdpSocket>,
    registry: Arc<SessionRegistry>,
    counters: Arc<SenderCounters>,
    config: Arc<ServerConfig>,
}

impl Streamer {
    fn run<S: PayloadSource>(self, mut source: S, running: &AtomicBool) {
        // Queue-fed sources (encoder output) are drained as fast as they fill
        let frame_interval = source.paced().then(|| self.config.frame_interval());
        let idle_interval = self.config.idle_interval();
        let mut frame_id: FrameId = 0;
        let mut status = StatusReporter::new(self.config.status_interval());

        while running.load(Ordering::SeqCst) {
            if self.registry.is_empty() {
                thread::sleep(idle_interval);
                continue;
            }

            let payload = match source.next_payload() {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    thread::sleep(SOURCE_POLL_INTERVAL);
                    continue;
                }
                Err(SourceError::Exhausted) => {
                    log::info!("[server] payload source exhausted, streaming stopped");
                    break;
                }
                Err(e) => {
                    log::warn!("[server] payload source error: {}", e);
                    thread::sleep(idle_interval);
                    continue;
                }
            };

            let packets = match packetize(&payload, frame_id, self.config.chunk_payload_size) {
                Ok(packets) => packets,
                Err(e) => {
                    log::warn!("[server] frame {} skipped: {}", frame_id, e);
                    continue;
                }
            };

            let targets = self.registry.endpoints();
            let failed = fan_out(&self.socket, &targets, &packets, &self.counters);
            if !failed.is_empty() {
                let removed = self.registry.remove_endpoints(&failed);
                self.counters
                    .clients_dropped
                    .fetch_add(removed as u64, Ordering::Relaxed);
                for endpoint in &failed {
                    log::warn!("[server] removed unresponsive client: {}", endpoint);
                }
            }

            self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
            frame_id = frame_id.wrapping_add(1);
            status.frame_sent(self.registry.len());

            if let Some(interval) = frame_interval {
                thread::sleep(interval);
            }
        }
        log::debug!("[server] streamer stopped");
    }
}

/// Send every packet to every target, in order.
///
/// A target stops receiving at its first failed send. Returns the targets that
/// failed; the caller removes them once the pass is over.
fn fan_out(
    socket: &UdpSocket,
    targets: &[SocketAddr],
    packets: &[Vec<u8>],
    counters: &SenderCounters,
) -> Vec<SocketAddr> {
    let mut failed = Vec::new();

    for &target in targets {
        for packet in packets {
            match socket.send_to(packet, target) {
                Ok(n) => {
                    counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                    counters.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.send_errors.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[server] error sending to client {}: {}", target, e);
                    failed.push(target);
                    break;
                }
            }
        }
    }

    failed
}

/// Periodic "frames sent / clients / fps" log line.
struct StatusReporter {
    interval: Option<Duration>,
    window_start: Instant,
    frames_in_window: u64,
    frames_total: u64,
}

impl StatusReporter {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            frames_in_window: 0,
            frames_total: 0,
        }
    }

    fn frame_sent(&mut self, client_count: usize) {
        self.frames_in_window += 1;
        self.frames_total += 1;

        let Some(interval) = self.interval else {
            return;
        };
        let elapsed = self.window_start.elapsed();
        if elapsed < interval {
            return;
        }

        let fps = self.frames_in_window as f64 / elapsed.as_secs_f64();
        log::info!(
            "[server] status: {} frames sent to {} client(s) | FPS: {:.1}",
            self.frames_total,
            client_count,
            fps
        );
        self.window_start = Instant::now();
        self.frames_in_window = 0;
    }
}

// ============================================================================
// Sweeper
// ============================================================================

fn run_sweeper(
    registry: &SessionRegistry,
    counters: &SenderCounters,
    config: &ServerConfig,
    running: &AtomicBool,
) {
    let interval = config.sweep_interval();
    let timeout = config.client_timeout();

    while running.load(Ordering::SeqCst) {
        if !sleep_while_running(interval, running) {
            break;
        }

        let removed = registry.sweep(Instant::now(), timeout);
        counters
            .clients_timed_out
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        for endpoint in removed {
            log::info!("[server] removed inactive client: {}", endpoint);
        }
    }
    log::debug!("[server] sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_socket() -> UdpSocket {
        bind_udp(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(500),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_fan_out_sends_all_packets_in_order() {
        let sender = loopback_socket();
        let receiver = loopback_socket();
        let target = receiver.local_addr().unwrap();
        let counters = SenderCounters::default();

        let packets = packetize(b"abcdefg", 3, 3).unwrap();
        let failed = fan_out(&sender, &[target], &packets, &counters);
        assert!(failed.is_empty());

        let mut buf = [0u8; 64];
        for expected in &packets {
            let (n, _) = receiver.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], expected.as_slice());
        }

        let stats = counters.snapshot();
        assert_eq!(stats.packets_sent, 4);
        assert_eq!(
            stats.bytes_sent,
            packets.iter().map(|p| p.len() as u64).sum::<u64>()
        );
    }

    #[test]
    fn test_fan_out_reports_failed_target_and_serves_the_rest() {
        let sender = loopback_socket();
        let receiver = loopback_socket();
        let good = receiver.local_addr().unwrap();
        // IPv6 destination from an IPv4 socket fails immediately
        let bad: SocketAddr = "[::1]:9".parse().unwrap();
        let counters = SenderCounters::default();

        let packets = packetize(b"xy", 1, 1).unwrap();
        let failed = fan_out(&sender, &[bad, good], &packets, &counters);

        assert_eq!(failed, vec![bad]);
        assert_eq!(counters.snapshot().send_errors, 1);

        let mut buf = [0u8; 64];
        for _ in &packets {
            receiver.recv_from(&mut buf).unwrap();
        }
    }

    #[test]
    fn test_control_handler_registers_and_acks() {
        let server = loopback_socket();
        let client = loopback_socket();
        let registry = SessionRegistry::new();
        let counters = SenderCounters::default();
        let mut handler = ControlHandler {
            socket: &server,
            registry: &registry,
            counters: &counters,
        };
        let client_addr = client.local_addr().unwrap();

        dispatch(b"REGISTER_CLIENT", client_addr, &mut handler);

        let mut buf = [0u8; 32];
        let (n, from) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"REGISTERED");
        assert_eq!(from, server.local_addr().unwrap());
        assert_eq!(registry.endpoints(), vec![client_addr]);

        // Disconnect from another port of the same host
        dispatch(b"DISCONNECT", "127.0.0.1:1".parse().unwrap(), &mut handler);
        assert!(registry.is_empty());

        let stats = counters.snapshot();
        assert_eq!(stats.clients_registered, 1);
        assert_eq!(stats.clients_disconnected, 1);
    }
}
