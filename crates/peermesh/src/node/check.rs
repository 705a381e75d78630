// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer aging and the election rule.
//!
//! Every `checkInterval` the loop sweeps expired peers out of the table,
//! recomputes the election counts from the survivors, and applies the rule:
//!
//! - a master demotes when at least `mastersRequired` live masters outweigh
//!   it;
//! - a non-master, eligible node promotes when fewer than `mastersRequired`
//!   live masters outweigh it AND no heavier non-master eligible peer is
//!   visible.
//!
//! Weight comparisons are strict, so equal-weight nodes never see each other
//! as dominant. The election is a pure function of the locally observed peer
//! set; no election messages exist, convergence is eventual.

use super::{sleep_with_shutdown, Inner};
use crate::peers::Summary;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Local election state change decided by one check iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Transition {
    Promote,
    Demote,
}

/// The election rule. A node demoted in this iteration does not promote in
/// the same iteration (`was_master` is the state at entry).
pub(super) fn decide(
    was_master: bool,
    eligible: bool,
    masters_required: i64,
    summary: &Summary,
) -> Option<Transition> {
    let higher = summary.masters_higher_weight as i64;
    if was_master && masters_required <= higher {
        return Some(Transition::Demote);
    }
    if !was_master && eligible && masters_required > higher && !summary.eligible_higher_weight {
        return Some(Transition::Promote);
    }
    None
}

pub(super) fn run(inner: Arc<Inner>) {
    let shutdown = Arc::clone(&inner.shutdown);
    while !shutdown.load(Ordering::Relaxed) {
        let (interval, node_timeout, master_timeout, local_weight, masters_required) = {
            let opts = inner.options.lock();
            (
                opts.check_interval,
                opts.node_timeout(),
                opts.master_timeout(),
                opts.weight,
                opts.masters_required,
            )
        };

        let now = SystemTime::now();
        let (removed, summary) = {
            let mut peers = inner.peers.lock();
            let removed = peers.sweep(now, node_timeout, master_timeout);
            let summary = peers.summary(now, local_weight, master_timeout);
            (removed, summary)
        };
        log::debug!(
            "[check] {} live masters ({} higher-weight), {} expired",
            summary.masters,
            summary.masters_higher_weight,
            removed.len()
        );

        // Hooks fire on snapshots, outside the peer-table lock.
        let hooks = inner.hooks.read();
        for peer in &removed {
            log::debug!(
                "[check] peer expired pid={} iid={} last_seen={:?}",
                peer.process_id,
                peer.instance_id,
                peer.last_seen
            );
            hooks.removed(peer);
        }

        let was_master = inner.is_master.load(Ordering::Relaxed);
        let eligible = inner.is_master_eligible.load(Ordering::Relaxed);
        match decide(was_master, eligible, masters_required, &summary) {
            Some(Transition::Demote) => {
                inner.is_master.store(false, Ordering::Relaxed);
                log::info!(
                    "[check] demoted: {} higher-weight masters visible (required {})",
                    summary.masters_higher_weight,
                    masters_required
                );
                hooks.demotion();
            }
            Some(Transition::Promote) => {
                inner.is_master.store(true, Ordering::Relaxed);
                log::info!("[check] promoted to master");
                hooks.promotion();
            }
            None => {}
        }
        hooks.check();
        drop(hooks);

        sleep_with_shutdown(&shutdown, Duration::from_millis(interval));
    }
    log::debug!("[check] loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(masters: usize, higher: usize, eligible_higher: bool) -> Summary {
        Summary {
            masters,
            masters_higher_weight: higher,
            eligible_higher_weight: eligible_higher,
        }
    }

    #[test]
    fn lone_eligible_node_promotes() {
        assert_eq!(
            decide(false, true, 1, &summary(0, 0, false)),
            Some(Transition::Promote)
        );
    }

    #[test]
    fn ineligible_node_never_promotes() {
        assert_eq!(decide(false, false, 1, &summary(0, 0, false)), None);
    }

    #[test]
    fn heavier_master_blocks_promotion() {
        assert_eq!(decide(false, true, 1, &summary(1, 1, false)), None);
    }

    #[test]
    fn heavier_eligible_peer_blocks_promotion() {
        assert_eq!(decide(false, true, 1, &summary(0, 0, true)), None);
    }

    #[test]
    fn lighter_master_does_not_block_promotion() {
        // A master is visible but outweighed; with mastersRequired = 1 the
        // local node still promotes (the cluster wants the heaviest masters).
        assert_eq!(
            decide(false, true, 1, &summary(1, 0, false)),
            Some(Transition::Promote)
        );
    }

    #[test]
    fn master_demotes_when_outweighed() {
        assert_eq!(
            decide(true, true, 1, &summary(1, 1, false)),
            Some(Transition::Demote)
        );
    }

    #[test]
    fn master_keeps_the_seat_against_equal_weight() {
        // Strict comparison: an equal-weight master is not "higher".
        assert_eq!(decide(true, true, 1, &summary(2, 0, false)), None);
    }

    #[test]
    fn masters_required_two_tolerates_one_heavier_master() {
        assert_eq!(decide(true, true, 2, &summary(1, 1, false)), None);
        assert_eq!(
            decide(false, true, 2, &summary(1, 1, false)),
            Some(Transition::Promote)
        );
        assert_eq!(
            decide(true, true, 2, &summary(2, 2, false)),
            Some(Transition::Demote)
        );
    }

    #[test]
    fn masters_required_zero_never_promotes_always_demotes() {
        assert_eq!(decide(false, true, 0, &summary(0, 0, false)), None);
        assert_eq!(
            decide(true, true, 0, &summary(0, 0, false)),
            Some(Transition::Demote)
        );
    }

    #[test]
    fn equal_weight_peers_both_promote() {
        // Two eligible nodes with identical weight each see the other as
        // non-dominant, so each one's rule says promote. Known convergence
        // hazard, preserved behavior.
        let view_of_other = summary(0, 0, false);
        assert_eq!(
            decide(false, true, 1, &view_of_other),
            Some(Transition::Promote)
        );
    }
}
