//! Wire format for the conclave group key agreement protocol.
//!
//! Messages travel over a pub/sub transport as opaque byte frames. Each frame
//! is a two-byte binary envelope (wire version + opcode) followed by a
//! CBOR-encoded record. The opcode selects the record type, so the CBOR body
//! carries no variant tag — a frame cannot claim one type in the envelope and
//! smuggle another in the body.
//!
//! The signature on a [`RoundMessage`] does NOT cover the CBOR bytes. It
//! covers the canonical layout returned by [`RoundMessage::signed_bytes`],
//! which is fixed independently of the serialization backend. See that method
//! for the exact layout.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod payloads;
pub mod wire;

pub use errors::{ProtocolError, Result};
pub use payloads::{Join, JoinResponse, Payload, RoundMessage, ROUND_ONE, ROUND_TWO};
pub use wire::{Opcode, MAX_WIRE_SIZE, WIRE_VERSION};
