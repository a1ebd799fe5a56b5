// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket setup.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

/// Bind a blocking UDP socket whose `recv` returns after `poll_timeout` so
/// the owning loop can notice shutdown.
///
/// `SO_REUSEADDR` is set so a restarted server can rebind its port at once.
/// `recv_buffer_size` enlarges `SO_RCVBUF` for bursty chunk traffic; the
/// kernel may clamp it.
pub fn bind_udp(
    addr: SocketAddr,
    poll_timeout: Duration,
    recv_buffer_size: Option<usize>,
) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Some(size) = recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            log::warn!("[UDP] could not set SO_RCVBUF={}: {}", size, e);
        }
    }

    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    // A zero timeout is rejected by set_read_timeout
    socket.set_read_timeout(Some(poll_timeout.max(Duration::from_millis(1))))?;

    log::debug!(
        "[UDP] bound {} (poll timeout {:?})",
        socket.local_addr()?,
        poll_timeout
    );
    Ok(socket)
}

/// Whether a `recv` error only means the poll timeout elapsed.
pub fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Pause after a receive error that is not a poll timeout.
pub(crate) const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Longest uninterrupted sleep in [`sleep_while_running`].
const SHUTDOWN_SLICE: Duration = Duration::from_millis(100);

/// One bounded receive for a polling loop.
///
/// Returns `None` when the poll timeout elapsed or the receive failed; a
/// failure is logged under `tag` and followed by [`RECV_ERROR_BACKOFF`].
pub(crate) fn recv_polled(
    socket: &UdpSocket,
    buf: &mut [u8],
    tag: &str,
) -> Option<(usize, SocketAddr)> {
    match socket.recv_from(buf) {
        Ok(received) => Some(received),
        Err(e) if is_poll_timeout(&e) => None,
        Err(e) => {
            // ICMP errors from earlier sends surface here on some platforms
            log::debug!("[{}] recv error: {}", tag, e);
            thread::sleep(RECV_ERROR_BACKOFF);
            None
        }
    }
}

/// Sleep `total` in short slices. Returns `false` if `running` was cleared.
pub(crate) fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SHUTDOWN_SLICE));
    }
}
