//! Error types for the exchange engine.
//!
//! The taxonomy matters more than the variants: authentication failures are
//! NOT errors (messages are dropped silently), protocol-format violations are
//! fatal to the exchange, and a failed closure check fails the exchange
//! without raising. Only the last category — asking for a session key before
//! one exists — is recoverable by the caller.

use conclave_crypto::GroupError;
use thiserror::Error;

use crate::transport::TransportError;

/// Fatal and recoverable conditions inside one exchange instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Fewer than two participants cannot form a ring.
    #[error("cohort of {participants} is too small for a key exchange")]
    CohortTooSmall {
        /// Configured participant count.
        participants: u32,
    },

    /// Local ring index outside `1..=N`.
    #[error("ring index {u} outside cohort of {participants}")]
    IndexOutOfRange {
        /// Offending index.
        u: u32,
        /// Configured participant count.
        participants: u32,
    },

    /// Authenticated message carried a round number the protocol does not
    /// have. The signature was valid, so a participant is broken; the
    /// exchange cannot continue.
    #[error("round {round} is not a valid protocol round")]
    InvalidRound {
        /// Offending round field.
        round: u8,
    },

    /// Authenticated round-2 message from a ring index outside the cohort.
    #[error("round-2 message from ring index {u} outside cohort of {participants}")]
    SenderOutOfRange {
        /// Offending sender index.
        u: u32,
        /// Configured participant count.
        participants: u32,
    },

    /// A public value failed group decoding (zero, out of range, oversized).
    #[error("malformed public value: {0}")]
    Group(#[from] GroupError),

    /// Round 2 ran without both neighbor round-1 messages present.
    #[error("round 2 requires round-1 messages from both ring neighbors")]
    MissingNeighborMessages,

    /// Key computation ran before round 2 completed.
    #[error("key computation requires a finished round 2")]
    RoundTwoIncomplete,

    /// Key computation is missing the round-2 message of a participant.
    #[error("key computation is missing the round-2 message from {u}")]
    MissingRoundTwo {
        /// Ring index whose message is absent.
        u: u32,
    },

    /// A deferred step ran before round 1 generated the local exponent.
    #[error("exchange has not started round 1")]
    NotStarted,

    /// Session key requested before an exchange succeeded. Recoverable: ask
    /// again after `has_new_key` reports success.
    #[error("no shared secret has been agreed upon")]
    NoSharedSecret,
}

/// Errors surfaced by the channel manager to its driver.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Frame failed structural decoding.
    #[error(transparent)]
    Protocol(#[from] conclave_proto::ProtocolError),

    /// The exchange hit a fatal protocol condition and is now failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The transport rejected a publish.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
