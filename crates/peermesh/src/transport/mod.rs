// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP datagram transport.
//!
//! One socket, three routing modes behind a uniform send/receive contract:
//!
//! - **broadcast**: SO_BROADCAST set, outbound datagrams go to the configured
//!   broadcast address.
//! - **multicast**: the group is joined at bind time, TTL applied, outbound
//!   datagrams go to the group.
//! - **unicast-list**: outbound datagrams go to each address of a
//!   comma-separated list, in list order.
//!
//! Mode precedence when several are configured: unicast beats multicast
//! beats broadcast. The destination port is always the configured bind port,
//! so every member of a mesh shares one port number.
//!
//! Sends are fire-and-forget: a failing destination is skipped and logged,
//! never retried. Inbound datagrams are handed to a dispatcher thread so a
//! slow callback cannot stall the socket read.

mod listener;

use crate::options::Options;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Ceiling on the blocking socket read, and therefore the worst-case
/// shutdown latency of the listener thread.
pub(crate) const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound delivery callback: `(sender ip dotted-quad, sender port, payload)`.
pub(crate) type MessageFn = Arc<dyn Fn(String, u16, Vec<u8>) + Send + Sync>;
/// Transport failure callback.
pub(crate) type ErrorFn = Arc<dyn Fn(String) + Send + Sync>;

/// Routing mode fixed at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Broadcast,
    Multicast,
    Unicast,
}

/// Bound UDP endpoint plus its listener/dispatcher threads.
pub(crate) struct Transport {
    socket: Arc<UdpSocket>,
    mode: Mode,
    /// Loopback-reachable address of the bound socket, used to wake the
    /// listener out of its blocking read at release time.
    wake_addr: SocketAddr,
    running: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Transport {
    /// Create and configure the socket per the options, selecting the mode by
    /// precedence. Socket create/bind/setsockopt failures are fatal to the
    /// transport and bubble up to `start`.
    pub fn bind(opts: &Options) -> crate::Result<Self> {
        let mode = if opts.unicast.is_some() {
            Mode::Unicast
        } else if opts.multicast.is_some() {
            Mode::Multicast
        } else {
            Mode::Broadcast
        };

        let bind_ip = parse_ipv4(&opts.address, "bind address")?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(io_context("create socket"))?;
        if opts.reuse_addr {
            socket
                .set_reuse_address(true)
                .map_err(io_context("set SO_REUSEADDR"))?;
        }
        if mode == Mode::Broadcast {
            socket
                .set_broadcast(true)
                .map_err(io_context("set SO_BROADCAST"))?;
        }

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(bind_ip, opts.port));
        socket
            .bind(&bind_addr.into())
            .map_err(io_context("bind socket"))?;

        if mode == Mode::Multicast {
            let group = parse_ipv4(opts.multicast.as_deref().unwrap_or_default(), "multicast group")?;
            socket
                .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                .map_err(io_context("join multicast group"))?;
            socket
                .set_multicast_ttl_v4(u32::from(opts.multicast_ttl))
                .map_err(io_context("set IP_MULTICAST_TTL"))?;
            socket
                .set_multicast_loop_v4(true)
                .map_err(io_context("set IP_MULTICAST_LOOP"))?;
        }

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(LISTEN_TIMEOUT))?;

        let local = socket.local_addr()?;
        let wake_ip = if bind_ip.is_unspecified() {
            Ipv4Addr::LOCALHOST
        } else {
            bind_ip
        };
        let wake_addr = SocketAddr::V4(SocketAddrV4::new(wake_ip, local.port()));

        log::debug!("[udp] bound {} mode={:?}", local, mode);

        Ok(Self {
            socket: Arc::new(socket),
            mode,
            wake_addr,
            running: Arc::new(AtomicBool::new(false)),
            listener: None,
            dispatcher: None,
        })
    }

    /// Spawn the listener and dispatcher threads. `on_message` runs on the
    /// dispatcher thread, one datagram at a time, in arrival order.
    pub fn start(&mut self, on_message: MessageFn, on_error: ErrorFn) -> crate::Result<()> {
        self.running.store(true, Ordering::Relaxed);
        let (listener, dispatcher) = listener::spawn(
            Arc::clone(&self.socket),
            Arc::clone(&self.running),
            on_message,
            on_error,
        )?;
        self.listener = Some(listener);
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    /// Routing mode selected at bind time.
    #[cfg(test)]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Fan the payload out to the destinations of the current mode.
    /// Best-effort: per-destination failures are logged and swallowed.
    pub fn send(&self, payload: &[u8], opts: &Options) {
        match self.mode {
            Mode::Unicast => {
                let list = opts.unicast.as_deref().unwrap_or("");
                for entry in list.split(',') {
                    let entry = entry.trim();
                    if entry.is_empty() {
                        continue;
                    }
                    match entry.parse::<Ipv4Addr>() {
                        Ok(ip) => self.send_to(payload, SocketAddrV4::new(ip, opts.port)),
                        Err(_) => {
                            log::debug!("[udp] skipping invalid unicast destination '{entry}'");
                        }
                    }
                }
            }
            Mode::Multicast => {
                let group = opts.multicast.as_deref().unwrap_or("");
                match group.parse::<Ipv4Addr>() {
                    Ok(ip) => self.send_to(payload, SocketAddrV4::new(ip, opts.port)),
                    Err(_) => log::debug!("[udp] invalid multicast group '{group}', dropping send"),
                }
            }
            Mode::Broadcast => match opts.broadcast.parse::<Ipv4Addr>() {
                Ok(ip) => self.send_to(payload, SocketAddrV4::new(ip, opts.port)),
                Err(_) => log::debug!(
                    "[udp] invalid broadcast address '{}', dropping send",
                    opts.broadcast
                ),
            },
        }
    }

    fn send_to(&self, payload: &[u8], dest: SocketAddrV4) {
        if let Err(err) = self.socket.send_to(payload, SocketAddr::V4(dest)) {
            log::debug!("[udp] send to {dest} failed: {err}");
        }
    }

    /// Stop the listener, wake it out of its blocking read, join both
    /// threads. The socket closes when the last reference drops.
    pub fn release(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        // Wake the listener without waiting out the read timeout. The byte is
        // not valid JSON, so it is dropped on the receive path if it arrives
        // before the listener notices the flag.
        let _ = self.socket.send_to(&[0u8], self.wake_addr);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        log::debug!("[udp] transport released");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if self.listener.is_some() || self.dispatcher.is_some() {
            self.release();
        }
    }
}

fn parse_ipv4(text: &str, label: &str) -> crate::Result<Ipv4Addr> {
    text.parse::<Ipv4Addr>().map_err(|err| {
        crate::Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {label} '{text}': {err}"),
        ))
    })
}

fn io_context(label: &'static str) -> impl Fn(io::Error) -> crate::Error {
    move |err| crate::Error::Io(io::Error::new(err.kind(), format!("{label}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    fn opts_on(port: u16) -> Options {
        let mut opts = Options::with_defaults();
        opts.address = "127.0.0.1".into();
        opts.port = port;
        opts
    }

    #[test]
    fn mode_precedence_unicast_beats_multicast_beats_broadcast() {
        let mut opts = opts_on(44211);
        let transport = Transport::bind(&opts).expect("broadcast bind");
        assert_eq!(transport.mode(), Mode::Broadcast);
        drop(transport);

        opts.multicast = Some("239.255.42.1".into());
        let transport = Transport::bind(&opts).expect("multicast bind");
        assert_eq!(transport.mode(), Mode::Multicast);
        drop(transport);

        opts.unicast = Some("127.0.0.1".into());
        let transport = Transport::bind(&opts).expect("unicast bind");
        assert_eq!(transport.mode(), Mode::Unicast);
    }

    #[test]
    fn invalid_bind_address_fails() {
        let mut opts = opts_on(44212);
        opts.address = "not-an-address".into();
        assert!(Transport::bind(&opts).is_err());
    }

    #[test]
    fn unicast_loopback_delivers_to_listener() {
        let mut opts = opts_on(44213);
        opts.unicast = Some("127.0.0.1".into());
        // Deliver our own datagrams back to ourselves for the test.
        let mut transport = Transport::bind(&opts).expect("bind");

        let (tx, rx) = channel::unbounded();
        let on_message: MessageFn = Arc::new(move |ip, port, payload| {
            let _ = tx.send((ip, port, payload));
        });
        let on_error: ErrorFn = Arc::new(|err| panic!("transport error: {err}"));
        transport.start(on_message, on_error).expect("start");

        transport.send(b"ping", &opts);

        let (ip, _port, payload) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("datagram should loop back");
        assert_eq!(ip, "127.0.0.1");
        assert_eq!(payload, b"ping");

        transport.release();
    }

    #[test]
    fn empty_unicast_list_sends_nothing() {
        let mut opts = opts_on(44214);
        opts.unicast = Some(String::new());
        let mut transport = Transport::bind(&opts).expect("bind");

        let (tx, rx) = channel::unbounded();
        let on_message: MessageFn = Arc::new(move |ip, port, payload| {
            let _ = tx.send((ip, port, payload));
        });
        transport
            .start(on_message, Arc::new(|_| {}))
            .expect("start");

        transport.send(b"silent", &opts);
        assert!(
            rx.recv_timeout(Duration::from_millis(300)).is_err(),
            "no destination, no delivery"
        );

        transport.release();
    }

    #[test]
    fn release_returns_promptly() {
        let mut opts = opts_on(44215);
        opts.unicast = Some("127.0.0.1".into());
        let mut transport = Transport::bind(&opts).expect("bind");
        transport
            .start(Arc::new(|_, _, _| {}), Arc::new(|_| {}))
            .expect("start");

        let started = std::time::Instant::now();
        transport.release();
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "wake datagram should cut the 5s read timeout short"
        );
    }
}
