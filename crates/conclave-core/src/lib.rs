//! Round-driven group key agreement engine.
//!
//! Participants on a pub/sub channel run the two-round Dutta–Barua group
//! Diffie–Hellman exchange to agree on a symmetric secret that no passive
//! observer and no non-participant can recover. The crate is organized
//! around a single-threaded event loop that owns all protocol state:
//!
//! - [`event_loop::EventLoop`] — cooperative task queue; transport callbacks
//!   and deferred round transitions all run to completion on it, so the
//!   exchange state needs no locking.
//! - [`exchange::KeyExchange`] — the per-channel, per-epoch round state
//!   machine. Pure protocol logic: it accepts already-authenticated messages
//!   and reports which transitions became due.
//! - [`manager::ChannelManager`] — wires a transport, a credential store and
//!   the event loop to one exchange instance per channel; authenticates
//!   inbound frames, signs and publishes outbound ones, and exposes
//!   `has_new_key` / `session_key` to the application.
//!
//! The transport, certificate loading and membership coordination are
//! collaborators behind the [`transport::Transport`],
//! [`conclave_crypto::CredentialStore`] and [`manager::JoinObserver`] seams.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod error;
pub mod event_loop;
pub mod exchange;
pub mod manager;
pub mod transport;

pub use channel::{ChannelBinding, PartyId};
pub use error::{ExchangeError, ManagerError};
pub use event_loop::EventLoop;
pub use exchange::{ExchangeConfig, ExchangeState, Gate, KeyExchange, KeyOutcome};
pub use manager::{ChannelManager, JoinObserver};
pub use transport::{Transport, TransportError};
