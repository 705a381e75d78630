// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer table: records for every remote instance seen on the wire, with a
//! lease-style expiry model driven by the check loop.
//!
//! Identity is the `(process_id, instance_id)` pair; at most one record per
//! identity. Traversal is insertion order.

use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Election state a peer reported in its last hello.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerData {
    /// Peer currently considers itself a master.
    pub is_master: bool,
    /// Peer may promote itself.
    pub is_master_eligible: bool,
    /// Peer's election weight.
    pub weight: f64,
    /// Peer's self-reported bind address.
    pub address: String,
    /// Peer's advertisement payload, if any.
    pub advertisement: Option<Value>,
}

/// One discovered remote instance.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Process UUID (shared by instances living in one process).
    pub process_id: String,
    /// Instance UUID (unique per instance).
    pub instance_id: String,
    /// Hostname the peer reported.
    pub hostname: String,
    /// Observed sender address (dotted quad) of the last hello.
    pub address: String,
    /// Observed sender port of the last hello.
    pub port: u16,
    /// When the last hello from this peer arrived.
    pub last_seen: SystemTime,
    /// Election state from the last hello.
    pub data: PeerData,
}

/// Election counts produced by one pass over the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    /// Peers currently claiming mastership, seen within the master timeout.
    pub masters: usize,
    /// Of those, how many outweigh the local node (strict comparison).
    pub masters_higher_weight: usize,
    /// Some non-master, master-eligible peer outweighs the local node.
    pub eligible_higher_weight: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    peers: Vec<Peer>,
}

impl PeerTable {
    /// Insert or refresh the record for `(pid, iid)`.
    ///
    /// Returns a snapshot of the record plus two flags: whether this call
    /// created it, and whether the pre-update state was master (the
    /// dispatcher needs the latter to decide on the master callback).
    pub fn upsert(
        &mut self,
        pid: &str,
        iid: &str,
        hostname: &str,
        address: &str,
        port: u16,
        now: SystemTime,
        data: PeerData,
    ) -> (Peer, bool, bool) {
        if let Some(peer) = self
            .peers
            .iter_mut()
            .find(|p| p.process_id == pid && p.instance_id == iid)
        {
            let was_master = peer.data.is_master;
            peer.hostname = hostname.to_string();
            peer.address = address.to_string();
            peer.port = port;
            peer.last_seen = now;
            peer.data = data;
            (peer.clone(), false, was_master)
        } else {
            let peer = Peer {
                process_id: pid.to_string(),
                instance_id: iid.to_string(),
                hostname: hostname.to_string(),
                address: address.to_string(),
                port,
                last_seen: now,
                data,
            };
            self.peers.push(peer.clone());
            (peer, true, false)
        }
    }

    /// Remove and return expired records.
    ///
    /// A record is expired when its `last_seen` lies in the future (the wall
    /// clock went backwards) or its age strictly exceeds the master timeout
    /// for peers claiming mastership, the node timeout otherwise. An age
    /// exactly equal to the timeout is retained.
    pub fn sweep(
        &mut self,
        now: SystemTime,
        node_timeout: Duration,
        master_timeout: Duration,
    ) -> Vec<Peer> {
        let mut removed = Vec::new();
        self.peers.retain(|peer| {
            let timeout = if peer.data.is_master {
                master_timeout
            } else {
                node_timeout
            };
            let keep = match now.duration_since(peer.last_seen) {
                Ok(age) => age <= timeout,
                Err(_) => false,
            };
            if !keep {
                removed.push(peer.clone());
            }
            keep
        });
        removed
    }

    /// One linear pass computing the counts the election rule needs.
    ///
    /// Masters only count while their last hello is strictly within the
    /// master timeout; weight comparisons are strict, so an equal-weight peer
    /// is never dominant.
    pub fn summary(&self, now: SystemTime, local_weight: f64, master_timeout: Duration) -> Summary {
        let mut summary = Summary::default();
        for peer in &self.peers {
            if peer.data.is_master {
                let fresh = now
                    .duration_since(peer.last_seen)
                    .map(|age| age < master_timeout)
                    .unwrap_or(false);
                if fresh {
                    summary.masters += 1;
                    if peer.data.weight > local_weight {
                        summary.masters_higher_weight += 1;
                    }
                }
            } else if peer.data.is_master_eligible && peer.data.weight > local_weight {
                summary.eligible_higher_weight = true;
            }
        }
        summary
    }

    /// Snapshot of every record, in insertion order.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
