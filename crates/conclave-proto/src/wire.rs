//! Binary envelope preceding every CBOR body.
//!
//! Layout on the wire: `[version: u8] [opcode: u8] [body: CBOR]`. The
//! envelope is validated before any CBOR parsing happens, so malformed or
//! oversized frames are rejected without handing attacker bytes to the
//! deserializer.

use crate::errors::{ProtocolError, Result};

/// Wire version understood by this build.
pub const WIRE_VERSION: u8 = 1;

/// Size of the fixed envelope in bytes.
pub const ENVELOPE_SIZE: usize = 2;

/// Upper bound on a whole frame.
///
/// A round message is dominated by a 512-byte group element plus a signature;
/// 4 KiB leaves generous slack while keeping hostile frames cheap to reject.
pub const MAX_WIRE_SIZE: usize = 4096;

/// Record type selector carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Key exchange round message (rounds 1 and 2).
    Round = 0x01,
    /// Join announcement (membership coordination).
    Join = 0x02,
    /// Response to a join announcement.
    JoinResponse = 0x03,
}

impl Opcode {
    /// Parse an opcode byte. `None` for unassigned values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Round),
            0x02 => Some(Self::Join),
            0x03 => Some(Self::JoinResponse),
            _ => None,
        }
    }

    /// The wire byte for this opcode.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Validate the envelope and split a frame into `(opcode, body)`.
///
/// # Errors
///
/// - [`ProtocolError::FrameTooLarge`] if the frame exceeds [`MAX_WIRE_SIZE`]
/// - [`ProtocolError::Truncated`] if the envelope is incomplete
/// - [`ProtocolError::UnsupportedVersion`] on a version mismatch
/// - [`ProtocolError::UnknownOpcode`] on an unassigned opcode byte
pub fn split_frame(bytes: &[u8]) -> Result<(Opcode, &[u8])> {
    if bytes.len() > MAX_WIRE_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_WIRE_SIZE });
    }
    if bytes.len() < ENVELOPE_SIZE {
        return Err(ProtocolError::Truncated { got: bytes.len(), need: ENVELOPE_SIZE });
    }
    if bytes[0] != WIRE_VERSION {
        return Err(ProtocolError::UnsupportedVersion(bytes[0]));
    }
    let opcode = Opcode::from_u8(bytes[1]).ok_or(ProtocolError::UnknownOpcode(bytes[1]))?;
    Ok((opcode, &bytes[ENVELOPE_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips() {
        for opcode in [Opcode::Round, Opcode::Join, Opcode::JoinResponse] {
            assert_eq!(Opcode::from_u8(opcode.to_u8()), Some(opcode));
        }
    }

    #[test]
    fn unassigned_opcodes_rejected() {
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0x04), None);
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn split_rejects_short_frames() {
        assert!(matches!(split_frame(&[]), Err(ProtocolError::Truncated { got: 0, .. })));
        assert!(matches!(split_frame(&[WIRE_VERSION]), Err(ProtocolError::Truncated { got: 1, .. })));
    }

    #[test]
    fn split_rejects_wrong_version() {
        let frame = [9u8, Opcode::Round.to_u8()];
        assert_eq!(split_frame(&frame), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn split_rejects_oversized_frames() {
        let frame = vec![WIRE_VERSION; MAX_WIRE_SIZE + 1];
        assert!(matches!(split_frame(&frame), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn split_yields_body() {
        let frame = [WIRE_VERSION, Opcode::Join.to_u8(), 0xaa, 0xbb];
        let (opcode, body) = split_frame(&frame).unwrap();
        assert_eq!(opcode, Opcode::Join);
        assert_eq!(body, &[0xaa, 0xbb]);
    }
}
