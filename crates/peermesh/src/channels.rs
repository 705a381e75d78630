// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel registry: regex-keyed pub/sub bindings for non-reserved events.
//!
//! The stored event string is a pattern, compiled at join time; the inbound
//! event is a literal. A binding matches when its pattern matches anywhere in
//! the literal. The reserved `"hello"` event never reaches this registry, the
//! dispatcher consumes it as a peer-state update.
//!
//! The registry mutex is held across join, leave, and dispatch, so subscriber
//! callbacks must not call back into join or leave.

use crate::error::Result;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// Subscriber callback: `(event literal, full parsed datagram)`.
pub(crate) type ChannelFn = Arc<dyn Fn(&str, &Value) + Send + Sync>;

struct Binding {
    event: String,
    pattern: Regex,
    callback: ChannelFn,
}

/// Ordered set of subscription bindings, keyed by the exact event string.
#[derive(Default)]
pub(crate) struct ChannelRegistry {
    bindings: Vec<Binding>,
}

impl ChannelRegistry {
    /// Subscribe. Re-joining an event string replaces its callback binding;
    /// an invalid pattern is rejected here rather than failing silently at
    /// dispatch time.
    pub fn join(&mut self, event: &str, callback: ChannelFn) -> Result<()> {
        let pattern = Regex::new(event)?;
        if let Some(binding) = self.bindings.iter_mut().find(|b| b.event == event) {
            binding.pattern = pattern;
            binding.callback = callback;
        } else {
            self.bindings.push(Binding {
                event: event.to_string(),
                pattern,
                callback,
            });
        }
        Ok(())
    }

    /// Unsubscribe the binding with this exact event string, if any.
    pub fn leave(&mut self, event: &str) {
        self.bindings.retain(|b| b.event != event);
    }

    /// Invoke every binding whose pattern matches the literal event with
    /// `(event, json)`, in subscription order.
    pub fn dispatch(&self, event: &str, json: &Value) {
        for binding in self.bindings.iter().filter(|b| b.pattern.is_match(event)) {
            (binding.callback)(event, json);
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: Arc<AtomicUsize>) -> ChannelFn {
        Arc::new(move |_event, _json| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn join_then_leave_restores_empty_registry() {
        let mut registry = ChannelRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.join("metrics", counting_callback(hits)).unwrap();
        assert_eq!(registry.len(), 1);
        registry.leave("metrics");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn pattern_matches_anywhere_in_literal() {
        let mut registry = ChannelRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        registry
            .join(r"^sensor\.", counting_callback(Arc::clone(&hits)))
            .unwrap();

        registry.dispatch("sensor.temp", &json!({}));
        registry.dispatch("log.info", &json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Unanchored pattern matches in the middle of the literal.
        registry.join("temp", counting_callback(Arc::clone(&hits))).unwrap();
        registry.dispatch("sensor.temperature", &json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 3, "both bindings match");
    }

    #[test]
    fn rejoin_replaces_callback() {
        let mut registry = ChannelRegistry::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.join("event", counting_callback(Arc::clone(&first))).unwrap();
        registry.join("event", counting_callback(Arc::clone(&second))).unwrap();
        assert_eq!(registry.len(), 1);

        registry.dispatch("event", &json!({}));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_pattern_rejected_at_join() {
        let mut registry = ChannelRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let result = registry.join("sensor.[", counting_callback(hits));
        assert!(result.is_err());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn callback_receives_event_and_full_json() {
        let mut registry = ChannelRegistry::default();
        let seen: Arc<parking_lot::Mutex<Vec<(String, Value)>>> = Arc::default();
        let seen_clone = Arc::clone(&seen);
        registry
            .join("status", Arc::new(move |event, json| {
                seen_clone.lock().push((event.to_string(), json.clone()));
            }))
            .unwrap();

        let datagram = json!({"event": "status", "pid": "p", "iid": "i", "data": {"ok": 1}});
        registry.dispatch("status", &datagram);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "status");
        assert_eq!(seen[0].1, datagram, "subscriber gets the full envelope");
    }
}
