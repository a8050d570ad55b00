//! Protocol records carried inside the wire envelope.
//!
//! Three record types exist: [`RoundMessage`] drives the two-round key
//! exchange; [`Join`] and [`JoinResponse`] belong to the membership
//! coordination layered on top of it and are passed through to a collaborator
//! unmodified.
//!
//! # Invariants
//!
//! - Each [`Payload`] variant maps to exactly one [`Opcode`]; `encode`
//!   followed by `decode` returns an equal value.
//! - [`RoundMessage::signed_bytes`] is byte-stable: any change to its layout
//!   is a protocol break, because peers verify signatures over exactly these
//!   bytes.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    wire::{self, Opcode, WIRE_VERSION},
};

/// Round field value for the first broadcast (public value `X_i`).
pub const ROUND_ONE: u8 = 1;

/// Round field value for the second broadcast (blinded quotient `Y_i`).
pub const ROUND_TWO: u8 = 2;

/// A signed key exchange broadcast.
///
/// `u` is the sender's 1-based ring index, `d` its exchange epoch.
/// `public_value` holds the minimal big-endian encoding of a group element:
/// `X_i = g^{x_i}` in round 1, `Y_i = K_i^r / K_i^l` in round 2. The
/// signature is produced over [`Self::signed_bytes`], never over the CBOR
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMessage {
    /// Sender's ring index (1-based).
    pub u: u32,
    /// Round number, [`ROUND_ONE`] or [`ROUND_TWO`].
    pub round: u8,
    /// Minimal big-endian group element bytes.
    pub public_value: Vec<u8>,
    /// Sender's exchange epoch.
    pub d: u32,
    /// Detached signature over [`Self::signed_bytes`]. Opaque to the codec.
    pub signature: Vec<u8>,
}

impl RoundMessage {
    /// Canonical byte layout covered by the signature.
    ///
    /// `u (4 bytes LE) ‖ round (1 byte) ‖ public_value ‖ d (4 bytes LE)`.
    ///
    /// Signer and verifier must agree on these bytes exactly; the layout is
    /// deliberately independent of the CBOR body so that re-serialization can
    /// never invalidate a signature.
    #[must_use]
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9 + self.public_value.len());
        buf.extend_from_slice(&self.u.to_le_bytes());
        buf.push(self.round);
        buf.extend_from_slice(&self.public_value);
        buf.extend_from_slice(&self.d.to_le_bytes());
        buf
    }
}

/// Announcement that a process wants to take part in the next exchange.
///
/// Handled by the membership coordination collaborator; the exchange core
/// itself never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Announcing party's ring index, if it already holds one.
    pub u: u32,
    /// Announcing party's exchange epoch.
    pub d: u32,
    /// Requested start of round 1, microseconds since the Unix epoch.
    pub requested_r1_start_us: i64,
}

/// Response to a [`Join`], carrying the agreed cohort and start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Ring indices of the full cohort for the upcoming exchange.
    pub participants: Vec<u32>,
    /// Agreed start of round 1, microseconds since the Unix epoch.
    pub r1_start_us: i64,
}

/// All record types, tagged by [`Opcode`] on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Key exchange round broadcast.
    Round(RoundMessage),
    /// Join announcement.
    Join(Join),
    /// Join response.
    JoinResponse(JoinResponse),
}

impl Payload {
    /// Opcode identifying this record type on the wire.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Round(_) => Opcode::Round,
            Self::Join(_) => Opcode::Join,
            Self::JoinResponse(_) => Opcode::JoinResponse,
        }
    }

    /// Encode envelope and body into `dst`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::CborEncode`] if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        dst.put_u8(WIRE_VERSION);
        dst.put_u8(self.opcode().to_u8());
        let mut writer = dst.writer();
        match self {
            Self::Round(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Join(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Encode into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::CborEncode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a whole frame (envelope + body).
    ///
    /// # Errors
    ///
    /// Envelope errors from [`wire::split_frame`], or
    /// [`ProtocolError::CborDecode`] if the body does not parse as the record
    /// type the opcode claims.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (opcode, body) = wire::split_frame(bytes)?;
        let payload = match opcode {
            Opcode::Round => Self::Round(
                ciborium::de::from_reader(body)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Join => Self::Join(
                ciborium::de::from_reader(body)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::JoinResponse => Self::JoinResponse(
                ciborium::de::from_reader(body)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
        };
        Ok(payload)
    }
}
