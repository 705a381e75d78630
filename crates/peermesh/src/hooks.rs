// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle callbacks.
//!
//! Nine hook kinds cover the node lifecycle: discovery (`added`, `master`,
//! `removed`, `helloReceived`), emission (`helloEmitted`), election
//! (`promotion`, `demotion`, `check`), and transport failures (`error`).
//! Registering a hook kind twice replaces the previous callback.
//!
//! Hooks are called from background threads (dispatcher, hello loop, check
//! loop). They must be `Send + Sync` and should not block; a peer passed by
//! reference is only valid for the duration of the call.

use crate::peers::Peer;

/// Callback receiving a peer snapshot.
pub type PeerHook = Box<dyn Fn(&Peer) + Send + Sync>;
/// Callback with no payload.
pub type NotifyHook = Box<dyn Fn() + Send + Sync>;
/// Callback receiving a human-readable transport error.
pub type ErrorHook = Box<dyn Fn(&str) + Send + Sync>;

/// One registerable lifecycle callback.
pub enum Hook {
    /// A hello datagram from a tracked peer was processed.
    HelloReceived(PeerHook),
    /// The local hello datagram was sent.
    HelloEmitted(NotifyHook),
    /// The check loop promoted the local node to master.
    Promotion(NotifyHook),
    /// The check loop demoted the local node.
    Demotion(NotifyHook),
    /// A check iteration finished.
    Check(NotifyHook),
    /// A previously unknown peer appeared.
    Added(PeerHook),
    /// A peer newly claims mastership.
    Master(PeerHook),
    /// A peer expired and was dropped from the table.
    Removed(PeerHook),
    /// A transport-level failure occurred.
    Error(ErrorHook),
}

impl Hook {
    pub fn hello_received(f: impl Fn(&Peer) + Send + Sync + 'static) -> Self {
        Hook::HelloReceived(Box::new(f))
    }

    pub fn hello_emitted(f: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::HelloEmitted(Box::new(f))
    }

    pub fn promotion(f: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::Promotion(Box::new(f))
    }

    pub fn demotion(f: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::Demotion(Box::new(f))
    }

    pub fn check(f: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::Check(Box::new(f))
    }

    pub fn added(f: impl Fn(&Peer) + Send + Sync + 'static) -> Self {
        Hook::Added(Box::new(f))
    }

    pub fn master(f: impl Fn(&Peer) + Send + Sync + 'static) -> Self {
        Hook::Master(Box::new(f))
    }

    pub fn removed(f: impl Fn(&Peer) + Send + Sync + 'static) -> Self {
        Hook::Removed(Box::new(f))
    }

    pub fn error(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Hook::Error(Box::new(f))
    }
}

/// Registered callbacks, one slot per kind.
#[derive(Default)]
pub(crate) struct Hooks {
    hello_received: Option<PeerHook>,
    hello_emitted: Option<NotifyHook>,
    promotion: Option<NotifyHook>,
    demotion: Option<NotifyHook>,
    check: Option<NotifyHook>,
    added: Option<PeerHook>,
    master: Option<PeerHook>,
    removed: Option<PeerHook>,
    error: Option<ErrorHook>,
}

impl Hooks {
    pub fn register(&mut self, hook: Hook) {
        match hook {
            Hook::HelloReceived(f) => self.hello_received = Some(f),
            Hook::HelloEmitted(f) => self.hello_emitted = Some(f),
            Hook::Promotion(f) => self.promotion = Some(f),
            Hook::Demotion(f) => self.demotion = Some(f),
            Hook::Check(f) => self.check = Some(f),
            Hook::Added(f) => self.added = Some(f),
            Hook::Master(f) => self.master = Some(f),
            Hook::Removed(f) => self.removed = Some(f),
            Hook::Error(f) => self.error = Some(f),
        }
    }

    pub fn hello_received(&self, peer: &Peer) {
        if let Some(f) = &self.hello_received {
            f(peer);
        }
    }

    pub fn hello_emitted(&self) {
        if let Some(f) = &self.hello_emitted {
            f();
        }
    }

    pub fn promotion(&self) {
        if let Some(f) = &self.promotion {
            f();
        }
    }

    pub fn demotion(&self) {
        if let Some(f) = &self.demotion {
            f();
        }
    }

    pub fn check(&self) {
        if let Some(f) = &self.check {
            f();
        }
    }

    pub fn added(&self, peer: &Peer) {
        if let Some(f) = &self.added {
            f(peer);
        }
    }

    pub fn master(&self, peer: &Peer) {
        if let Some(f) = &self.master {
            f(peer);
        }
    }

    pub fn removed(&self, peer: &Peer) {
        if let Some(f) = &self.removed {
            f(peer);
        }
    }

    pub fn error(&self, message: &str) {
        if let Some(f) = &self.error {
            f(message);
        }
    }
}
