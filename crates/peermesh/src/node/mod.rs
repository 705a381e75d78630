// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The local node: lifecycle, options, hooks, election state, and the
//! background workers that keep the mesh view current.
//!
//! # Architecture
//!
//! ```text
//! hello loop ----> transport.send ----> the wire
//! user send  ----/
//!
//! the wire --> listener --> dispatcher --> peer table + hooks
//!                                      \-> channel registry --> subscribers
//!
//! check loop --> sweep peers + election rule --> promotion/demotion hooks
//! ```
//!
//! All workers are plain threads with a shared shutdown flag; `release`
//! signals them, wakes the listener, joins everything, and frees the peer
//! table and channel registry. There is no implicit signal handling: the
//! host decides when to call `release`.

mod check;
mod dispatch;
mod hello;

use crate::channels::ChannelRegistry;
use crate::error::{Error, Result};
use crate::hooks::{Hook, Hooks};
use crate::options::Options;
use crate::peers::{Peer, PeerTable};
use crate::transport::{ErrorFn, MessageFn, Transport};
use crate::wire;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Slice length for interruptible sleeps; bounds how long a loop keeps
/// running after `release` signals shutdown.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// State shared between the public handle and the background workers.
pub(crate) struct Inner {
    pub(crate) process_id: String,
    pub(crate) instance_id: String,
    pub(crate) options: Mutex<Options>,
    pub(crate) peers: Mutex<PeerTable>,
    pub(crate) channels: Mutex<ChannelRegistry>,
    pub(crate) hooks: RwLock<Hooks>,
    pub(crate) is_master: AtomicBool,
    pub(crate) is_master_eligible: AtomicBool,
    started: AtomicBool,
    released: AtomicBool,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) transport: Mutex<Option<Transport>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    /// Fan a prepared datagram out through the transport, reading the
    /// destination options under the options mutex.
    pub(crate) fn send_payload(&self, payload: &[u8]) -> Result<()> {
        let opts = self.options.lock();
        let transport = self.transport.lock();
        match transport.as_ref() {
            Some(transport) => {
                transport.send(payload, &opts);
                Ok(())
            }
            None => Err(Error::NotStarted),
        }
    }
}

/// A discovery instance.
///
/// Create one, adjust options, register hooks and channel subscriptions,
/// then [`start`](Node::start) it. The node announces itself every
/// `helloInterval` (unless in client mode), tracks every peer it hears,
/// runs the election rule every `checkInterval`, and dispatches non-reserved
/// events to channel subscribers.
///
/// ```no_run
/// use peermesh::{Hook, Node};
/// use serde_json::json;
///
/// fn main() -> peermesh::Result<()> {
///     let node = Node::new();
///     node.set_option("port", 12345u64)?;
///     node.on(Hook::added(|peer| {
///         println!("discovered {} on {}", peer.instance_id, peer.address);
///     }))?;
///     node.on(Hook::promotion(|| println!("promoted to master")))?;
///     node.join("sensor\\.", |event, json| {
///         println!("{event}: {}", json["data"]);
///     })?;
///     node.start()?;
///     node.send("sensor.temp", &json!({"celsius": 21.5}))?;
///     node.release();
///     Ok(())
/// }
/// ```
pub struct Node {
    inner: Arc<Inner>,
}

impl Node {
    /// Create a node with fresh process and instance identifiers.
    pub fn new() -> Self {
        Self::build(Uuid::new_v4().to_string())
    }

    /// Create a node that reports the given process identifier, for hosts
    /// running several instances in one process.
    pub fn with_process_id(process_id: impl Into<String>) -> Self {
        Self::build(process_id.into())
    }

    fn build(process_id: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                process_id,
                instance_id: Uuid::new_v4().to_string(),
                options: Mutex::new(Options::with_defaults()),
                peers: Mutex::new(PeerTable::default()),
                channels: Mutex::new(ChannelRegistry::default()),
                hooks: RwLock::new(Hooks::default()),
                is_master: AtomicBool::new(false),
                is_master_eligible: AtomicBool::new(true),
                started: AtomicBool::new(false),
                released: AtomicBool::new(false),
                shutdown: Arc::new(AtomicBool::new(false)),
                transport: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Process UUID reported in every outbound datagram.
    #[must_use]
    pub fn process_id(&self) -> &str {
        &self.inner.process_id
    }

    /// Instance UUID, unique to this node.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Hostname reported in every outbound datagram.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.inner.options.lock().hostname.clone()
    }

    /// Current election weight.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.inner.options.lock().weight
    }

    /// Whether this node currently considers itself a master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.inner.is_master.load(Ordering::Relaxed)
    }

    /// Whether the check loop may promote this node.
    #[must_use]
    pub fn is_master_eligible(&self) -> bool {
        self.inner.is_master_eligible.load(Ordering::Relaxed)
    }

    /// Set one option by name. See the option table in the crate docs.
    /// Writes that would violate
    /// `checkInterval <= nodeTimeout <= masterTimeout` are rejected and the
    /// previous value stays in place.
    pub fn set_option(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_live()?;
        self.inner.options.lock().set(name, value.into())
    }

    /// Read one option back by name.
    pub fn option(&self, name: &str) -> Result<Value> {
        self.ensure_live()?;
        self.inner.options.lock().get(name)
    }

    /// Register a lifecycle hook. Registering the same kind twice replaces
    /// the earlier callback.
    pub fn on(&self, hook: Hook) -> Result<()> {
        self.ensure_live()?;
        self.inner.hooks.write().register(hook);
        Ok(())
    }

    /// Bind the transport and launch the background workers.
    ///
    /// Bind failures are reported through the error hook and returned.
    pub fn start(&self) -> Result<()> {
        self.ensure_live()?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let transport = {
            let opts = self.inner.options.lock();
            if opts.masters_required == 0 {
                log::warn!("[node] mastersRequired is 0: this node will never promote itself");
            }
            Transport::bind(&opts)
        };
        let mut transport = match transport {
            Ok(transport) => transport,
            Err(err) => {
                self.inner.started.store(false, Ordering::SeqCst);
                self.inner.hooks.read().error(&err.to_string());
                return Err(err);
            }
        };

        let inner = Arc::clone(&self.inner);
        let on_message: MessageFn = Arc::new(move |ip, port, payload| {
            dispatch::handle_datagram(&inner, &ip, port, &payload);
        });
        let inner = Arc::clone(&self.inner);
        let on_error: ErrorFn = Arc::new(move |message| {
            log::debug!("[udp] {message}");
            inner.hooks.read().error(&message);
        });

        if let Err(err) = transport.start(on_message, on_error) {
            self.inner.started.store(false, Ordering::SeqCst);
            self.inner.hooks.read().error(&err.to_string());
            return Err(err);
        }
        *self.inner.transport.lock() = Some(transport);

        let client = self.inner.options.lock().client;
        let mut workers = self.inner.workers.lock();
        let inner = Arc::clone(&self.inner);
        workers.push(
            thread::Builder::new()
                .name("peermesh-check".to_string())
                .spawn(move || check::run(inner))?,
        );
        if !client {
            let inner = Arc::clone(&self.inner);
            workers.push(
                thread::Builder::new()
                    .name("peermesh-hello".to_string())
                    .spawn(move || hello::run(inner))?,
            );
        }

        log::debug!(
            "[node] started pid={} iid={} client={}",
            self.inner.process_id,
            self.inner.instance_id,
            client
        );
        Ok(())
    }

    /// Replace the advertisement attached to each hello. `Value::Null`
    /// clears it.
    pub fn advertise(&self, advertisement: Value) -> Result<()> {
        self.ensure_live()?;
        self.inner.options.lock().advertisement = if advertisement.is_null() {
            None
        } else {
            Some(advertisement)
        };
        Ok(())
    }

    /// Claim mastership immediately and restore eligibility.
    pub fn promote(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.is_master.store(true, Ordering::Relaxed);
        self.inner.is_master_eligible.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Step down from mastership. With `permanent` the node also stops being
    /// eligible, so no check iteration re-promotes it until an explicit
    /// [`promote`](Node::promote).
    pub fn demote(&self, permanent: bool) -> Result<()> {
        self.ensure_live()?;
        self.inner.is_master.store(false, Ordering::Relaxed);
        self.inner
            .is_master_eligible
            .store(!permanent, Ordering::Relaxed);
        Ok(())
    }

    /// Subscribe to events whose literal name matches the given pattern.
    /// Re-joining the same pattern string replaces the callback.
    pub fn join(
        &self,
        event: &str,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Result<()> {
        self.ensure_live()?;
        self.inner.channels.lock().join(event, Arc::new(callback))
    }

    /// Drop the subscription with this exact pattern string, if any.
    pub fn leave(&self, event: &str) -> Result<()> {
        self.ensure_live()?;
        self.inner.channels.lock().leave(event);
        Ok(())
    }

    /// Send a named application event to the mesh. At-most-once, no retry.
    pub fn send(&self, event: &str, data: &Value) -> Result<()> {
        self.ensure_live()?;
        let payload = {
            let opts = self.inner.options.lock();
            wire::encode_envelope(
                event,
                &self.inner.process_id,
                &self.inner.instance_id,
                &opts.hostname,
                data,
            )
        };
        self.inner.send_payload(&payload)
    }

    /// Snapshot of every tracked peer, in discovery order.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.inner.peers.lock().snapshot()
    }

    /// Stop all loops, close the transport, and free peers and
    /// subscriptions. Idempotent; every later operation returns
    /// [`Error::Released`]. Must not be called from inside a hook.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.store(true, Ordering::Relaxed);
        let transport = self.inner.transport.lock().take();
        if let Some(mut transport) = transport {
            transport.release();
        }
        let workers: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
        let peers_dropped = {
            let mut peers = self.inner.peers.lock();
            let count = peers.len();
            peers.clear();
            count
        };
        let subscriptions_dropped = {
            let mut channels = self.inner.channels.lock();
            let count = channels.len();
            channels.clear();
            count
        };
        log::debug!(
            "[node] released iid={} ({peers_dropped} peers, {subscriptions_dropped} subscriptions dropped)",
            self.inner.instance_id
        );
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.released.load(Ordering::SeqCst) {
            Err(Error::Released)
        } else {
            Ok(())
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.release();
    }
}

/// Sleep for `duration`, waking early when the shutdown flag is set.
pub(crate) fn sleep_with_shutdown(shutdown: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
