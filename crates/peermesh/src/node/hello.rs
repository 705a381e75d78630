// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic hello announcements.
//!
//! Every `helloInterval` the loop rebuilds the hello datagram from the
//! current options and election state and fans it out through the transport.
//! The interval is re-read each iteration, so option changes take effect on
//! the following round. Client-mode nodes never run this loop.

use super::{sleep_with_shutdown, Inner};
use crate::wire::{self, HelloData};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

pub(super) fn run(inner: Arc<Inner>) {
    let shutdown = Arc::clone(&inner.shutdown);
    while !shutdown.load(Ordering::Relaxed) {
        let (payload, interval) = {
            let opts = inner.options.lock();
            let hello = HelloData {
                is_master: inner.is_master.load(Ordering::Relaxed),
                is_master_eligible: inner.is_master_eligible.load(Ordering::Relaxed),
                weight: opts.weight,
                address: opts.address.clone(),
                advertisement: opts.advertisement.clone(),
            };
            let payload = wire::encode_envelope(
                wire::HELLO_EVENT,
                &inner.process_id,
                &inner.instance_id,
                &opts.hostname,
                &hello.to_value(),
            );
            (payload, opts.hello_interval)
        };

        // NotStarted only races with release; the flag check ends the loop.
        let _ = inner.send_payload(&payload);
        inner.hooks.read().hello_emitted();

        sleep_with_shutdown(&shutdown, Duration::from_millis(interval));
    }
    log::debug!("[hello] loop stopped");
}
