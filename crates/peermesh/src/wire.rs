// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire format: one JSON object per UDP datagram, UTF-8 text, no framing.
//!
//! Envelope:
//! ```text
//! { "event": <string>, "pid": <uuid>, "iid": <uuid>,
//!   "hostName": <string>, "data": <event-specific JSON> }
//! ```
//!
//! For the reserved `"hello"` event the `data` member must be an object
//! carrying the sender's election state (see [`HelloData`]). For every other
//! event it is an opaque value the sender chose. Decoding is tolerant of
//! unknown extra members and strict about required ones: any missing or
//! mistyped field makes the datagram undecodable and the receive path drops
//! it silently.

use serde::Deserialize;
use serde_json::{json, Value};

/// Reserved event name consumed by the dispatcher as a peer-state update.
/// Never forwarded to channel subscribers.
pub const HELLO_EVENT: &str = "hello";

/// Election state carried in the `data` member of a hello datagram.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HelloData {
    /// Sender currently considers itself a master.
    #[serde(rename = "isMaster")]
    pub is_master: bool,
    /// Sender may promote itself.
    #[serde(rename = "isMasterEligible")]
    pub is_master_eligible: bool,
    /// Sender's election weight.
    pub weight: f64,
    /// Sender's self-reported bind address (dotted quad).
    pub address: String,
    /// Application payload, any JSON value.
    #[serde(default)]
    pub advertisement: Option<Value>,
}

impl HelloData {
    /// Build the `data` object for an outbound hello.
    pub fn to_value(&self) -> Value {
        let mut data = json!({
            "isMaster": self.is_master,
            "isMasterEligible": self.is_master_eligible,
            "weight": self.weight,
            "address": self.address,
        });
        if let Some(advertisement) = &self.advertisement {
            data["advertisement"] = advertisement.clone();
        }
        data
    }

    /// Parse the `data` member of an inbound hello. Returns `None` when a
    /// required field is missing or has the wrong type.
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Encode a complete datagram envelope as compact JSON text.
pub fn encode_envelope(event: &str, pid: &str, iid: &str, host_name: &str, data: &Value) -> Vec<u8> {
    json!({
        "event": event,
        "pid": pid,
        "iid": iid,
        "hostName": host_name,
        "data": data,
    })
    .to_string()
    .into_bytes()
}
