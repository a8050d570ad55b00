//! Deterministic multi-party simulation harness.
//!
//! Spins up a cohort of participants wired to an in-memory multicast bus
//! with loopback delivery, each with its own event loop and synthetic
//! Ed25519 credentials derived from a seed. Tests drive delivery explicitly,
//! which makes interleavings, message loss and in-flight tampering
//! reproducible.
//!
//! This is test infrastructure, not a transport implementation: the bus
//! delivers every published frame to every participant, exactly once, in the
//! order the test chooses.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bus;
pub mod cluster;

pub use bus::{Bus, BusTransport, InFlight};
pub use cluster::{Cluster, Party};

use conclave_proto::{Payload, RoundMessage};

/// Install a logging subscriber for test output. Safe to call repeatedly;
/// only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Decode a bus frame as a round message, if it is one.
#[must_use]
pub fn decode_round(frame: &[u8]) -> Option<RoundMessage> {
    match Payload::decode(frame) {
        Ok(Payload::Round(msg)) => Some(msg),
        _ => None,
    }
}

/// Re-encode a (possibly mutated) round message into a bus frame.
#[must_use]
pub fn encode_round(msg: RoundMessage) -> Vec<u8> {
    Payload::Round(msg).to_bytes().expect("invariant: round messages always encode")
}
