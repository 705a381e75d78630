// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound datagram classification.
//!
//! Runs on the dispatcher thread, one datagram at a time, which serializes
//! peer-table updates per sender and keeps the hook order for a single
//! hello: `added`, then `master`, then `helloReceived`.
//!
//! Anything malformed is dropped without a callback: surfacing garbage
//! datagrams would hand a hostile sender a log-flood lever.

use super::Inner;
use crate::peers::PeerData;
use crate::wire::{self, HelloData};
use serde_json::Value;
use std::time::SystemTime;

pub(super) fn handle_datagram(inner: &Inner, ip: &str, port: u16, payload: &[u8]) {
    let json: Value = match serde_json::from_slice(payload) {
        Ok(json) => json,
        Err(_) => {
            log::debug!("[dispatch] dropping non-JSON datagram from {ip}:{port}");
            return;
        }
    };

    let (ignore_process, ignore_instance) = {
        let opts = inner.options.lock();
        (opts.ignore_process, opts.ignore_instance)
    };

    let Some(pid) = json.get("pid").and_then(Value::as_str) else {
        return;
    };
    if ignore_process && pid == inner.process_id {
        return;
    }
    let Some(iid) = json.get("iid").and_then(Value::as_str) else {
        return;
    };
    if ignore_instance && iid == inner.instance_id {
        return;
    }
    let Some(event) = json.get("event").and_then(Value::as_str) else {
        return;
    };

    if event == wire::HELLO_EVENT {
        handle_hello(inner, ip, port, &json, pid, iid);
    } else {
        inner.channels.lock().dispatch(event, &json);
    }
}

fn handle_hello(inner: &Inner, ip: &str, port: u16, json: &Value, pid: &str, iid: &str) {
    let Some(hostname) = json.get("hostName").and_then(Value::as_str) else {
        return;
    };
    let Some(data) = json.get("data") else {
        return;
    };
    let Some(hello) = HelloData::from_value(data) else {
        log::debug!("[dispatch] dropping hello with malformed data from {ip}:{port}");
        return;
    };

    let peer_data = PeerData {
        is_master: hello.is_master,
        is_master_eligible: hello.is_master_eligible,
        weight: hello.weight,
        address: hello.address,
        advertisement: hello.advertisement,
    };

    let (peer, was_new, was_master) = inner.peers.lock().upsert(
        pid,
        iid,
        hostname,
        ip,
        port,
        SystemTime::now(),
        peer_data,
    );

    // Hooks see a snapshot, the table lock is already gone.
    let hooks = inner.hooks.read();
    if was_new {
        log::debug!("[dispatch] peer added pid={pid} iid={iid} from {ip}:{port}");
        hooks.added(&peer);
    }
    if peer.data.is_master && (was_new || !was_master) {
        hooks.master(&peer);
    }
    hooks.hello_received(&peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hook;
    use crate::node::Node;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn datagram(value: &Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    fn hello_json(pid: &str, iid: &str, is_master: bool) -> Value {
        json!({
            "event": "hello",
            "pid": pid,
            "iid": iid,
            "hostName": "host-x",
            "data": {
                "isMaster": is_master,
                "isMasterEligible": true,
                "weight": 2.0,
                "address": "10.1.1.1",
            },
        })
    }

    fn event_log(node: &Node) -> Arc<Mutex<Vec<String>>> {
        let events: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&events);
        node.on(Hook::added(move |p| {
            log.lock().push(format!("added:{}", p.instance_id));
        }))
        .unwrap();
        let log = Arc::clone(&events);
        node.on(Hook::master(move |p| {
            log.lock().push(format!("master:{}", p.instance_id));
        }))
        .unwrap();
        let log = Arc::clone(&events);
        node.on(Hook::hello_received(move |p| {
            log.lock().push(format!("hello:{}", p.instance_id));
        }))
        .unwrap();
        events
    }

    #[test]
    fn hello_fires_added_master_hello_in_order() {
        let node = Node::new();
        let events = event_log(&node);

        handle_datagram(
            &node.inner,
            "10.1.1.1",
            40000,
            &datagram(&hello_json("p1", "i1", true)),
        );
        assert_eq!(
            events.lock().as_slice(),
            ["added:i1", "master:i1", "hello:i1"]
        );

        // Second hello from the same peer: no added, master only on a
        // false->true transition.
        events.lock().clear();
        handle_datagram(
            &node.inner,
            "10.1.1.1",
            40000,
            &datagram(&hello_json("p1", "i1", true)),
        );
        assert_eq!(events.lock().as_slice(), ["hello:i1"]);
    }

    #[test]
    fn master_fires_again_on_false_to_true_transition() {
        let node = Node::new();
        let events = event_log(&node);

        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&hello_json("p", "i", false)));
        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&hello_json("p", "i", true)));
        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&hello_json("p", "i", true)));

        let events = events.lock();
        assert_eq!(
            events.as_slice(),
            ["added:i", "hello:i", "master:i", "hello:i", "hello:i"]
        );
    }

    #[test]
    fn malformed_datagrams_fire_nothing() {
        let node = Node::new();
        let events = event_log(&node);

        handle_datagram(&node.inner, "10.1.1.1", 1, b"not json");
        // Missing pid.
        handle_datagram(
            &node.inner,
            "10.1.1.1",
            1,
            &datagram(&json!({"event": "hello", "iid": "i"})),
        );
        // pid has the wrong type.
        handle_datagram(
            &node.inner,
            "10.1.1.1",
            1,
            &datagram(&json!({"event": "hello", "pid": 42, "iid": "i"})),
        );
        // Missing event.
        handle_datagram(
            &node.inner,
            "10.1.1.1",
            1,
            &datagram(&json!({"pid": "p", "iid": "i"})),
        );
        // Hello without data.
        handle_datagram(
            &node.inner,
            "10.1.1.1",
            1,
            &datagram(&json!({"event": "hello", "pid": "p", "iid": "i", "hostName": "h"})),
        );
        // Hello with a mistyped weight.
        let mut bad = hello_json("p", "i", false);
        bad["data"]["weight"] = json!("heavy");
        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&bad));

        assert!(events.lock().is_empty());
        assert!(node.peers().is_empty());

        // The pipeline still works afterwards.
        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&hello_json("p", "i", false)));
        assert_eq!(node.peers().len(), 1);
    }

    #[test]
    fn own_process_and_instance_filters() {
        let node = Node::new();
        let events = event_log(&node);

        // Same pid as ours: dropped by ignoreProcess.
        let mut own_pid = hello_json("x", "other-iid", false);
        own_pid["pid"] = json!(node.process_id());
        handle_datagram(&node.inner, "127.0.0.1", 1, &datagram(&own_pid));
        assert!(events.lock().is_empty());

        // With ignoreProcess off the same datagram is accepted.
        node.set_option("ignoreProcess", false).unwrap();
        handle_datagram(&node.inner, "127.0.0.1", 1, &datagram(&own_pid));
        assert_eq!(node.peers().len(), 1);

        // Own iid is still dropped by ignoreInstance.
        let mut own_iid = hello_json("x", "y", false);
        own_iid["pid"] = json!(node.process_id());
        own_iid["iid"] = json!(node.instance_id());
        handle_datagram(&node.inner, "127.0.0.1", 1, &datagram(&own_iid));
        assert_eq!(node.peers().len(), 1);
    }

    #[test]
    fn non_hello_events_reach_channels_with_full_envelope() {
        let node = Node::new();
        let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
        let log = Arc::clone(&seen);
        node.join(r"^job\.", move |event, json| {
            log.lock().push((event.to_string(), json.clone()));
        })
        .unwrap();

        let envelope = json!({
            "event": "job.done",
            "pid": "p",
            "iid": "i",
            "hostName": "h",
            "data": {"id": 7},
        });
        handle_datagram(&node.inner, "10.0.0.9", 5000, &datagram(&envelope));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "job.done");
        assert_eq!(seen[0].1, envelope, "full envelope, not just data");
    }

    #[test]
    fn hello_never_reaches_channel_subscribers() {
        let node = Node::new();
        let hits: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&hits);
        // This pattern would match the literal "hello".
        node.join("hello", move |event, _| {
            log.lock().push(event.to_string());
        })
        .unwrap();

        handle_datagram(&node.inner, "10.1.1.1", 1, &datagram(&hello_json("p", "i", false)));
        assert!(hits.lock().is_empty(), "reserved event bypasses channels");
        assert_eq!(node.peers().len(), 1, "consumed as a peer update instead");
    }
}
