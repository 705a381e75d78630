// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener and dispatcher threads.
//!
//! ```text
//! recv_from (5s timeout) -> channel -> dispatcher -> message callback
//! ```
//!
//! The listener does nothing but read datagrams and push them onto the
//! channel; the dispatcher drains the channel and runs the callback. One
//! datagram at a time, arrival order preserved, and the socket read never
//! waits on user code. The queue is unbounded: slow callbacks accumulate
//! datagrams rather than dropping them.

use super::{ErrorFn, MessageFn};
use crossbeam::channel;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

struct Datagram {
    ip: String,
    port: u16,
    payload: Vec<u8>,
}

/// Spawn the listener/dispatcher pair. The dispatcher exits when the
/// listener does (the channel sender drops), so joining both after clearing
/// `running` drains in-flight datagrams and stops cleanly.
pub(super) fn spawn(
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
    on_message: MessageFn,
    on_error: ErrorFn,
) -> io::Result<(JoinHandle<()>, JoinHandle<()>)> {
    let (tx, rx) = channel::unbounded::<Datagram>();

    let listener = thread::Builder::new()
        .name("peermesh-listener".to_string())
        .spawn(move || {
            listen_loop(&socket, &running, &tx, &on_error);
        })?;

    let dispatcher = thread::Builder::new()
        .name("peermesh-dispatch".to_string())
        .spawn(move || {
            for datagram in rx {
                on_message(datagram.ip, datagram.port, datagram.payload);
            }
        })?;

    Ok((listener, dispatcher))
}

fn listen_loop(
    socket: &UdpSocket,
    running: &AtomicBool,
    tx: &channel::Sender<Datagram>,
    on_error: &ErrorFn,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(sender))) => {
                let datagram = Datagram {
                    ip: sender.ip().to_string(),
                    port: sender.port(),
                    payload: buf[..len].to_vec(),
                };
                if tx.send(datagram).is_err() {
                    break;
                }
            }
            // IPv4-only wire format; anything else is skipped.
            Ok((_, SocketAddr::V6(_))) => continue,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            // Windows reports ICMP port-unreachable from previous sends as
            // ConnectionReset on the next receive; not fatal.
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(err) => {
                on_error(format!("udp receive failed: {err}"));
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
    log::debug!("[udp] listener stopped");
}
