//! Error types for wire encoding and decoding.
//!
//! Codec errors are strictly structural. Authentication failures are NOT
//! protocol errors — signature verification happens after decoding and is
//! reported through a different path, so a malformed frame can never be
//! confused with a forged one.

use thiserror::Error;

/// Convenience alias used throughout the codec.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame shorter than the fixed envelope.
    #[error("frame truncated: {got} bytes, envelope needs {need}")]
    Truncated {
        /// Bytes actually present.
        got: usize,
        /// Minimum bytes required.
        need: usize,
    },

    /// Envelope carries a wire version this build does not speak.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Envelope carries an opcode with no known record type.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Frame exceeds the protocol size bound.
    #[error("frame too large: {size} bytes exceeds {max}")]
    FrameTooLarge {
        /// Bytes received.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// CBOR serialization failed.
    #[error("cbor encode: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("cbor decode: {0}")]
    CborDecode(String),
}
