// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.

use thiserror::Error;

/// Errors returned by peermesh operations.
///
/// Malformed inbound datagrams are never surfaced here: they are dropped
/// silently on the receive path so that a hostile sender cannot flood the
/// error callback.
#[derive(Debug, Error)]
pub enum Error {
    /// `set_option` / `option` called with a name outside the option table.
    #[error("unknown option: {0}")]
    UnknownOption(String),

    /// Option value has the wrong type or violates the interval ordering
    /// invariant (`checkInterval <= nodeTimeout <= masterTimeout`).
    #[error("invalid value for option {option}: {reason}")]
    InvalidOption {
        /// Option name as given to `set_option`.
        option: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Channel subscription pattern failed to compile.
    #[error("invalid channel pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Socket create/bind/setsockopt or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires `start` to have been called.
    #[error("node not started")]
    NotStarted,

    /// `start` called twice.
    #[error("node already started")]
    AlreadyStarted,

    /// Operation issued after `release`.
    #[error("node released")]
    Released,
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "bind");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn display_includes_option_name() {
        let err = Error::InvalidOption {
            option: "nodeTimeout".into(),
            reason: "below checkInterval".into(),
        };
        let text = err.to_string();
        assert!(text.contains("nodeTimeout"));
        assert!(text.contains("below checkInterval"));
    }
}
