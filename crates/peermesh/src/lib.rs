// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # peermesh - decentralized peer discovery and master election over UDP
//!
//! Processes on an IP network find one another, elect one or more master
//! nodes by weighted consensus, and exchange named application messages -
//! with no central coordinator. The wire format is one JSON object per UDP
//! datagram, compatible with the node-discover family of libraries, so mixed
//! meshes interoperate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peermesh::{Hook, Node};
//! use serde_json::json;
//!
//! fn main() -> peermesh::Result<()> {
//!     let node = Node::new();
//!     node.set_option("weight", 10.0)?;
//!     node.on(Hook::promotion(|| println!("I am master now")))?;
//!     node.on(Hook::added(|peer| println!("found {}", peer.instance_id)))?;
//!     node.join("metrics\\..*", |event, json| {
//!         println!("{event}: {json}");
//!     })?;
//!     node.start()?;
//!     node.send("metrics.cpu", &json!({"load": 0.42}))?;
//!     // ... run until the host decides to stop ...
//!     node.release();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                              Node                                |
//! |  options | hooks | election state (isMaster, isMasterEligible)   |
//! +------------------------------------------------------------------+
//! | hello loop        | check loop          | dispatcher             |
//! | announce self     | age out peers,      | hello -> peer table    |
//! | every interval    | run election rule   | other -> channels      |
//! +------------------------------------------------------------------+
//! |                      UDP transport                               |
//! |        broadcast  /  multicast  /  unicast-list                  |
//! +------------------------------------------------------------------+
//! ```
//!
//! ## Discovery and election
//!
//! Every non-client node broadcasts a `hello` datagram each `helloInterval`
//! carrying its identity, election state, weight, and an optional
//! advertisement. Receivers track senders in a peer table; a peer whose
//! hellos stop is dropped after `nodeTimeout` (`masterTimeout` for masters).
//!
//! There is no voting round-trip. Each node periodically evaluates the same
//! rule against its own view: a master demotes when `mastersRequired`
//! heavier masters are visible; an eligible non-master promotes when fewer
//! than `mastersRequired` heavier masters are visible and no heavier
//! eligible peer is waiting. Weights compare strictly, defaults are derived
//! from the wall clock and sit just below zero, so any user-supplied
//! positive weight dominates.
//!
//! ## Channels
//!
//! [`Node::join`] subscribes a regex pattern to non-reserved events;
//! [`Node::send`] publishes. The reserved event name `"hello"` is consumed
//! by the discovery layer and never reaches subscribers.
//!
//! ## What this crate does not do
//!
//! Delivery is best-effort UDP: unreliable, unordered, plaintext. There is
//! no flow control, no authentication, no NAT traversal, and no IPv6 (the
//! wire carries dotted-quad IPv4 text). The `key` option is accepted for
//! interface compatibility and ignored.

mod channels;
/// Crate error type.
pub mod error;
/// Lifecycle callbacks (the nine hook kinds).
pub mod hooks;
/// The local node and its background workers.
pub mod node;
mod options;
/// Peer records and the peer table model.
pub mod peers;
mod transport;
/// Wire format: envelope and hello payload.
pub mod wire;

pub use error::{Error, Result};
pub use hooks::{ErrorHook, Hook, NotifyHook, PeerHook};
pub use node::Node;
pub use peers::{Peer, PeerData};

// Values on the wire are JSON; re-exported so hosts need no direct
// serde_json dependency for simple use.
pub use serde_json::Value;
