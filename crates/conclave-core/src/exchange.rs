//! The Dutta–Barua round state machine.
//!
//! One [`KeyExchange`] instance covers one channel for one epoch. It is pure
//! protocol logic: messages reaching [`KeyExchange::accept`] have already
//! been authenticated, and every outgoing message leaves unsigned for the
//! manager to sign and publish. The instance never talks to a transport, a
//! clock or a credential store, which is what makes the round logic testable
//! without any of them.
//!
//! # Protocol
//!
//! With `N` participants on a ring (1-based indices, `wrap(k) = ((k−1) mod N)
//! + 1`):
//!
//! - Round 1: each `U_i` samples `x_i` and broadcasts `X_i = g^{x_i}`.
//! - Round 2: once both ring neighbors' `X` values arrived, `U_i` computes
//!   the pairwise results `K_i^l = X_{i−1}^{x_i}`, `K_i^r = X_{i+1}^{x_i}`
//!   and broadcasts `Y_i = K_i^r · (K_i^l)^{−1}`.
//! - Key: once all `N` round-2 values are present, the chain of right keys
//!   `K_{wrap(u+j)}^R = Y_{wrap(u+j)} · K_{wrap(u+j−1)}^R` is rebuilt from
//!   `K_u^R = K_u^r`; it must close on `K_u^l`, and the shared secret is the
//!   product of all `N` right keys.
//!
//! Transitions are deferred: `accept` only records state and reports which
//! [`Gate`]s became satisfied, and the manager posts the corresponding steps
//! onto the event loop. Steps are idempotent, so posting a gate twice is
//! harmless — the reason duplicated or re-ordered deliveries cannot corrupt
//! the run.

use std::collections::BTreeMap;
use std::time::Duration;

use conclave_crypto::{derive_session_key, DhScalar, GroupElement, ModpGroup};
use conclave_proto::{RoundMessage, ROUND_ONE, ROUND_TWO};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::channel::PartyId;
use crate::error::ExchangeError;

/// Timing constants for the orchestration around an exchange.
///
/// The exchange itself never reads a clock; these are the knobs the
/// surrounding join/recovery coordination uses when scheduling delayed tasks
/// on the event loop.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Delay between the first observed join announcement and round 1.
    pub join_wait: Duration,
    /// Mean delay before answering a join announcement.
    pub join_response_delay: Duration,
    /// Jitter applied to the join response delay.
    pub join_response_jitter: Duration,
    /// Deadline for a whole exchange attempt before the orchestration
    /// restarts it with the next epoch.
    pub exchange_timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            join_wait: Duration::from_millis(125),
            join_response_delay: Duration::from_millis(50),
            join_response_jitter: Duration::from_millis(20),
            exchange_timeout: Duration::from_millis(800),
        }
    }
}

/// Lifecycle of one exchange instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Constructed, round 1 not yet run.
    NotStarted,
    /// Local round-1 broadcast produced.
    Round1Sent,
    /// Local round-2 broadcast produced.
    Round2Sent,
    /// Shared secret established. Terminal.
    KeyReady,
    /// Exchange aborted (protocol violation or closure-check failure).
    /// Terminal; recovery means a fresh instance with the next epoch.
    Failed,
}

/// A deferred step that became due after accepting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Both neighbor round-1 messages are present: run round 2.
    Round2,
    /// Round 2 finished and all `N` round-2 messages are present: compute
    /// the key.
    ComputeKey,
}

/// Result of a key computation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Shared secret established.
    Established,
    /// The step was a duplicate of one that already ran. No state change.
    AlreadyDone,
    /// The right-key chain did not close on the left pairwise result. The
    /// exchange is failed; no key was emitted.
    Mismatch,
}

/// Pairwise Diffie–Hellman results with the two ring neighbors.
struct NeighborResults {
    /// `X_{i−1}^{x_i}`.
    left: GroupElement,
    /// `X_{i+1}^{x_i}`.
    right: GroupElement,
}

/// Round state for one channel and one epoch.
pub struct KeyExchange {
    uid: PartyId,
    participants: u32,
    state: ExchangeState,
    x_i: Option<DhScalar>,
    r1_left: Option<RoundMessage>,
    r1_right: Option<RoundMessage>,
    r1_results: Option<NeighborResults>,
    r2_finished: bool,
    r2_messages: BTreeMap<u32, RoundMessage>,
    peer_epochs: BTreeMap<u32, u32>,
    shared_secret: Option<GroupElement>,
}

impl KeyExchange {
    /// Create the exchange for `uid` in a cohort of `participants`.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::CohortTooSmall`] for fewer than two participants,
    /// [`ExchangeError::IndexOutOfRange`] if `uid.u` is not in `1..=N`.
    pub fn new(uid: PartyId, participants: u32) -> Result<Self, ExchangeError> {
        if participants < 2 {
            return Err(ExchangeError::CohortTooSmall { participants });
        }
        if uid.u == 0 || uid.u > participants {
            return Err(ExchangeError::IndexOutOfRange { u: uid.u, participants });
        }
        Ok(Self {
            uid,
            participants,
            state: ExchangeState::NotStarted,
            x_i: None,
            r1_left: None,
            r1_right: None,
            r1_results: None,
            r2_finished: false,
            r2_messages: BTreeMap::new(),
            peer_epochs: BTreeMap::new(),
            shared_secret: None,
        })
    }

    /// This participant's identity.
    #[must_use]
    pub fn uid(&self) -> PartyId {
        self.uid
    }

    /// Cohort size `N`.
    #[must_use]
    pub fn participants(&self) -> u32 {
        self.participants
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Epoch `d` last seen from participant `u`, if any message arrived.
    #[must_use]
    pub fn peer_epoch(&self, u: u32) -> Option<u32> {
        self.peer_epochs.get(&u).copied()
    }

    /// 1-indexed ring wraparound.
    fn wrap(&self, k: u32) -> u32 {
        ((k - 1) % self.participants) + 1
    }

    /// Ring index of `U_{i−1}`.
    #[must_use]
    pub fn left_neighbor(&self) -> u32 {
        self.wrap(self.uid.u + self.participants - 1)
    }

    /// Ring index of `U_{i+1}`.
    #[must_use]
    pub fn right_neighbor(&self) -> u32 {
        self.wrap(self.uid.u + 1)
    }

    /// Whether `u` is an immediate ring neighbor.
    #[must_use]
    pub fn is_neighbor(&self, u: u32) -> bool {
        u == self.left_neighbor() || u == self.right_neighbor()
    }

    /// Run round 1: sample the private exponent and produce the unsigned
    /// `X_i` broadcast.
    ///
    /// Idempotent: returns `None` if round 1 already ran, so a duplicated
    /// posted task does nothing. The exponent is sampled exactly once per
    /// instance and never leaves it.
    pub fn round1<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Option<RoundMessage> {
        if self.x_i.is_some() || matches!(self.state, ExchangeState::Failed) {
            return None;
        }
        let group = ModpGroup::modp_4096();
        let x = group.random_scalar(rng);
        let public_value = group.generator_pow(&x).encode();
        self.x_i = Some(x);
        self.state = ExchangeState::Round1Sent;
        Some(RoundMessage {
            u: self.uid.u,
            round: ROUND_ONE,
            public_value,
            d: self.uid.d,
            signature: Vec::new(),
        })
    }

    /// Record an authenticated message and report which gates became due.
    ///
    /// Round-1 messages are only taken from the two ring neighbors; anything
    /// else at round 1 is not addressed to this participant and is ignored.
    /// In the 2-party ring both neighbor slots name the same peer and both
    /// receive the message. Round-2 messages are keyed by sender; a
    /// duplicate overwrites, since the verifier already bound the sender.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::InvalidRound`] and
    /// [`ExchangeError::SenderOutOfRange`] are fatal: the signature was
    /// valid, so a cohort member is violating the protocol.
    pub fn accept(&mut self, msg: RoundMessage) -> Result<Vec<Gate>, ExchangeError> {
        if matches!(self.state, ExchangeState::KeyReady | ExchangeState::Failed) {
            return Ok(Vec::new());
        }
        match msg.round {
            ROUND_ONE => {
                if msg.u == self.left_neighbor() {
                    self.peer_epochs.insert(msg.u, msg.d);
                    self.r1_left = Some(msg.clone());
                }
                if msg.u == self.right_neighbor() {
                    self.peer_epochs.insert(msg.u, msg.d);
                    self.r1_right = Some(msg);
                }
            },
            ROUND_TWO => {
                if msg.u == 0 || msg.u > self.participants {
                    return Err(ExchangeError::SenderOutOfRange {
                        u: msg.u,
                        participants: self.participants,
                    });
                }
                self.peer_epochs.insert(msg.u, msg.d);
                self.r2_messages.insert(msg.u, msg);
            },
            round => return Err(ExchangeError::InvalidRound { round }),
        }
        Ok(self.pending_gates())
    }

    /// Gates whose preconditions currently hold.
    ///
    /// `accept` returns this after every message; callers re-check it after
    /// running a round step, because finishing round 2 can make the key
    /// computation due without another message arriving.
    #[must_use]
    pub fn pending_gates(&self) -> Vec<Gate> {
        let mut gates = Vec::new();
        if matches!(self.state, ExchangeState::KeyReady | ExchangeState::Failed) {
            return gates;
        }
        if !self.r2_finished
            && self.x_i.is_some()
            && self.r1_left.is_some()
            && self.r1_right.is_some()
        {
            gates.push(Gate::Round2);
        }
        if self.r2_finished && self.r2_messages.len() as u32 == self.participants {
            gates.push(Gate::ComputeKey);
        }
        gates
    }

    /// Run round 2: derive both pairwise results and produce the unsigned
    /// `Y_i` broadcast.
    ///
    /// Idempotent: returns `Ok(None)` once round 2 has finished.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Group`] if a neighbor's public value does not decode
    /// to a group element; [`ExchangeError::MissingNeighborMessages`] /
    /// [`ExchangeError::NotStarted`] if the gate preconditions do not hold.
    pub fn round2(&mut self) -> Result<Option<RoundMessage>, ExchangeError> {
        if self.r2_finished || matches!(self.state, ExchangeState::Failed) {
            return Ok(None);
        }
        let x = self.x_i.as_ref().ok_or(ExchangeError::NotStarted)?;
        let (left_msg, right_msg) = match (&self.r1_left, &self.r1_right) {
            (Some(left), Some(right)) => (left, right),
            _ => return Err(ExchangeError::MissingNeighborMessages),
        };

        let group = ModpGroup::modp_4096();
        let left_x = group.decode(&left_msg.public_value)?;
        let right_x = group.decode(&right_msg.public_value)?;
        let left = group.pow(&left_x, x);
        let right = group.pow(&right_x, x);
        assert!(left.bits() > 0 && right.bits() > 0);

        let y = group.mul(&right, &group.inverse(&left)?);
        assert!(y.bits() > 0);

        let msg = RoundMessage {
            u: self.uid.u,
            round: ROUND_TWO,
            public_value: y.encode(),
            d: self.uid.d,
            signature: Vec::new(),
        };
        self.r1_results = Some(NeighborResults { left, right });
        self.r2_finished = true;
        self.state = ExchangeState::Round2Sent;
        Ok(Some(msg))
    }

    /// Rebuild the right-key chain, check that it closes, and derive the
    /// shared secret.
    ///
    /// Idempotent: returns [`KeyOutcome::AlreadyDone`] once a key exists or
    /// the exchange is failed. A closure-check failure reports
    /// [`KeyOutcome::Mismatch`] and fails the exchange without raising.
    ///
    /// # Errors
    ///
    /// Gate-precondition violations ([`ExchangeError::RoundTwoIncomplete`],
    /// [`ExchangeError::MissingRoundTwo`]) and malformed stored public
    /// values ([`ExchangeError::Group`]).
    pub fn compute_key(&mut self) -> Result<KeyOutcome, ExchangeError> {
        if self.shared_secret.is_some() || matches!(self.state, ExchangeState::Failed) {
            return Ok(KeyOutcome::AlreadyDone);
        }
        if !self.r2_finished {
            return Err(ExchangeError::RoundTwoIncomplete);
        }
        let results = self.r1_results.as_ref().ok_or(ExchangeError::RoundTwoIncomplete)?;

        let group = ModpGroup::modp_4096();
        let mut right_keys: BTreeMap<u32, GroupElement> = BTreeMap::new();
        right_keys.insert(self.uid.u, results.right.clone());

        let mut current = results.right.clone();
        for offset in 1..self.participants {
            let idx = self.wrap(self.uid.u + offset);
            let msg = self
                .r2_messages
                .get(&idx)
                .ok_or(ExchangeError::MissingRoundTwo { u: idx })?;
            let y = group.decode(&msg.public_value)?;
            current = group.mul(&y, &current);
            right_keys.insert(idx, current.clone());
        }

        // The chain walked the whole ring; its last element is the right key
        // of the left neighbor and must equal the pairwise result computed
        // directly in round 2. A mismatch means some Y was inconsistent.
        let closing = self.wrap(self.uid.u + self.participants - 1);
        let closes = right_keys
            .get(&closing)
            .expect("invariant: the chain filled every ring index")
            == &results.left;
        if !closes {
            self.state = ExchangeState::Failed;
            return Ok(KeyOutcome::Mismatch);
        }

        let secret = right_keys
            .values()
            .fold(GroupElement::one(), |acc, key| group.mul(&acc, key));
        self.shared_secret = Some(secret);
        self.state = ExchangeState::KeyReady;
        Ok(KeyOutcome::Established)
    }

    /// Mark the exchange failed. Terminal; used for fatal protocol errors
    /// and by the orchestration's timeout handling.
    pub fn fail(&mut self) {
        self.state = ExchangeState::Failed;
    }

    /// Derive `len` bytes of session key from the shared secret.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::NoSharedSecret`] until the exchange succeeded.
    pub fn session_key(&self, len: usize) -> Result<Vec<u8>, ExchangeError> {
        let secret = self.shared_secret.as_ref().ok_or(ExchangeError::NoSharedSecret)?;
        let encoded = Zeroizing::new(secret.encode());
        Ok(derive_session_key(&encoded, len))
    }
}
