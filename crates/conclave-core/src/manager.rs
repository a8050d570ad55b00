//! Per-channel wiring between transport, credentials and the exchange.
//!
//! A [`ChannelManager`] owns one [`KeyExchange`] per epoch for one secured
//! channel. Inbound frames from the transport callback are decoded and
//! authenticated here; outbound round messages are signed here; round
//! transitions run as tasks on the event loop. Because every task and every
//! callback runs on the loop thread, the manager uses plain interior
//! mutability and is `!Send` by construction.
//!
//! Recovery works through the epoch counter: every posted task captures the
//! epoch it was created for and is discarded if the live exchange has moved
//! on. [`ChannelManager::restart`] swaps in a fresh exchange with the next
//! epoch; [`ChannelManager::arm_timeout`] schedules a deadline that restarts
//! a still-unfinished exchange.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use conclave_crypto::CredentialStore;
use conclave_proto::{Join, JoinResponse, Payload, RoundMessage};
use rand::{CryptoRng, RngCore};

use crate::channel::{ChannelBinding, PartyId};
use crate::error::{ExchangeError, ManagerError};
use crate::event_loop::EventLoop;
use crate::exchange::{ExchangeConfig, ExchangeState, Gate, KeyExchange, KeyOutcome};
use crate::transport::Transport;

/// Collaborator notified of membership coordination records.
///
/// Join handling decides cohort composition and round-1 timing for future
/// exchanges; the manager only transports the records. The default wiring
/// (no observer) logs and drops them.
pub trait JoinObserver {
    /// A join announcement arrived on the channel.
    fn on_join(&self, join: &Join);
    /// A join response arrived on the channel.
    fn on_join_response(&self, response: &JoinResponse);
}

/// Owner of the key exchange on one secured channel.
pub struct ChannelManager<T, C, R> {
    weak_self: Weak<Self>,
    channel: ChannelBinding,
    config: ExchangeConfig,
    event_loop: Rc<EventLoop>,
    transport: Rc<T>,
    credentials: Rc<C>,
    rng: RefCell<R>,
    exchange: RefCell<KeyExchange>,
    join_observer: RefCell<Option<Rc<dyn JoinObserver>>>,
    has_new_key: Cell<bool>,
}

impl<T, C, R> ChannelManager<T, C, R>
where
    T: Transport + 'static,
    C: CredentialStore + 'static,
    R: RngCore + CryptoRng + 'static,
{
    /// Create the manager and post round 1 of the first exchange onto the
    /// event loop.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::CohortTooSmall`] / [`ExchangeError::IndexOutOfRange`]
    /// for invalid cohort parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: ChannelBinding,
        uid: PartyId,
        participants: u32,
        config: ExchangeConfig,
        event_loop: Rc<EventLoop>,
        transport: Rc<T>,
        credentials: Rc<C>,
        rng: R,
    ) -> Result<Rc<Self>, ExchangeError> {
        let exchange = KeyExchange::new(uid, participants)?;
        let manager = Rc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            channel,
            config,
            event_loop,
            transport,
            credentials,
            rng: RefCell::new(rng),
            exchange: RefCell::new(exchange),
            join_observer: RefCell::new(None),
            has_new_key: Cell::new(false),
        });
        manager.post_round1();
        Ok(manager)
    }

    /// The channel this manager secures.
    #[must_use]
    pub fn channel(&self) -> &ChannelBinding {
        &self.channel
    }

    /// Identity of the local participant in the current epoch.
    #[must_use]
    pub fn uid(&self) -> PartyId {
        self.exchange.borrow().uid()
    }

    /// Lifecycle state of the current exchange.
    #[must_use]
    pub fn exchange_state(&self) -> ExchangeState {
        self.exchange.borrow().state()
    }

    /// Orchestration timing constants.
    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Install the membership coordination collaborator.
    pub fn set_join_observer(&self, observer: Rc<dyn JoinObserver>) {
        *self.join_observer.borrow_mut() = Some(observer);
    }

    /// One-shot success flag: `true` exactly once per established key.
    #[must_use]
    pub fn has_new_key(&self) -> bool {
        self.has_new_key.replace(false)
    }

    /// Derive `len` bytes of session key from the agreed secret.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::NoSharedSecret`] until an exchange succeeded.
    pub fn session_key(&self, len: usize) -> Result<Vec<u8>, ExchangeError> {
        self.exchange.borrow().session_key(len)
    }

    /// Transport receive callback: decode, authenticate and dispatch one
    /// frame. Must be invoked on the event-loop thread.
    ///
    /// Authentication failures drop the frame silently (logged at debug) and
    /// are NOT errors.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Protocol`] for undecodable frames and
    /// [`ManagerError::Exchange`] for fatal protocol violations; the latter
    /// leaves the exchange failed.
    pub fn handle_message(&self, channel: &str, frame: &[u8]) -> Result<(), ManagerError> {
        if channel != self.channel.exchange_channel() {
            tracing::debug!(channel = %self.channel, got = channel, "frame for another channel ignored");
            return Ok(());
        }
        match Payload::decode(frame)? {
            Payload::Round(msg) => self.on_round_message(msg),
            Payload::Join(join) => {
                let observer = self.join_observer.borrow().clone();
                match observer {
                    Some(observer) => observer.on_join(&join),
                    None => tracing::debug!(channel = %self.channel, u = join.u, "join ignored (no observer)"),
                }
                Ok(())
            },
            Payload::JoinResponse(response) => {
                let observer = self.join_observer.borrow().clone();
                match observer {
                    Some(observer) => observer.on_join_response(&response),
                    None => {
                        tracing::debug!(channel = %self.channel, "join response ignored (no observer)");
                    },
                }
                Ok(())
            },
        }
    }

    /// Replace the exchange with a fresh instance under the next epoch and
    /// post its round 1. Called by the orchestration after a failure or
    /// timeout.
    pub fn restart(&self) {
        let (next, participants) = {
            let exchange = self.exchange.borrow();
            (PartyId { u: exchange.uid().u, d: exchange.uid().d + 1 }, exchange.participants())
        };
        let fresh = KeyExchange::new(next, participants)
            .expect("invariant: parameters were valid at construction");
        *self.exchange.borrow_mut() = fresh;
        self.has_new_key.set(false);
        tracing::debug!(channel = %self.channel, epoch = next.d, "restarting key exchange");
        self.post_round1();
    }

    /// Schedule a deadline for the current attempt. If the exchange has not
    /// reached `key_ready` when it expires (and has not been superseded), it
    /// is restarted with the next epoch.
    pub fn arm_timeout(&self) {
        let weak = self.weak_self.clone();
        let epoch = self.exchange.borrow().uid().d;
        let deadline = Instant::now() + self.config.exchange_timeout;
        self.event_loop.add_task(deadline, move || {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            let (live_epoch, state) = {
                let exchange = manager.exchange.borrow();
                (exchange.uid().d, exchange.state())
            };
            if live_epoch == epoch && state != ExchangeState::KeyReady {
                tracing::warn!(channel = %manager.channel, epoch, "exchange timed out; restarting");
                manager.restart();
            }
        });
    }

    /// Post a task that runs only while the capturing epoch is still live.
    fn post_guarded(&self, step: impl FnOnce(&Self) + 'static) {
        let weak = self.weak_self.clone();
        let epoch = self.exchange.borrow().uid().d;
        self.event_loop.push_task(move || {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            if manager.exchange.borrow().uid().d == epoch {
                step(&manager);
            } else {
                tracing::debug!(epoch, "discarding task from superseded exchange");
            }
        });
    }

    fn post_round1(&self) {
        self.post_guarded(Self::run_round1);
    }

    fn post_gates(&self, gates: Vec<Gate>) {
        for gate in gates {
            match gate {
                Gate::Round2 => self.post_guarded(Self::run_round2),
                Gate::ComputeKey => self.post_guarded(Self::run_compute_key),
            }
        }
    }

    fn post_pending_gates(&self) {
        let gates = self.exchange.borrow().pending_gates();
        self.post_gates(gates);
    }

    fn on_round_message(&self, msg: RoundMessage) -> Result<(), ManagerError> {
        let urn = self.channel.authorization_urn(msg.u);
        if !self.credentials.verify(&urn, &msg.signed_bytes(), &msg.signature) {
            tracing::debug!(channel = %self.channel, u = msg.u, round = msg.round,
                "dropping round message that failed authentication");
            return Ok(());
        }
        let result = self.exchange.borrow_mut().accept(msg);
        match result {
            Ok(gates) => {
                self.post_gates(gates);
                Ok(())
            },
            Err(error) => {
                self.exchange.borrow_mut().fail();
                tracing::error!(channel = %self.channel, error = %error,
                    "fatal protocol violation; exchange failed");
                Err(error.into())
            },
        }
    }

    fn run_round1(&self) {
        let msg = {
            let mut exchange = self.exchange.borrow_mut();
            let mut rng = self.rng.borrow_mut();
            exchange.round1(&mut *rng)
        };
        if let Some(msg) = msg {
            tracing::debug!(channel = %self.channel, u = msg.u, "starting round 1");
            self.sign_and_publish(msg);
        }
        self.post_pending_gates();
    }

    fn run_round2(&self) {
        let result = self.exchange.borrow_mut().round2();
        match result {
            Ok(Some(msg)) => {
                tracing::debug!(channel = %self.channel, u = msg.u, "starting round 2");
                self.sign_and_publish(msg);
                self.post_pending_gates();
            },
            Ok(None) => {},
            Err(error) => self.fail_exchange("round 2 failed", &error),
        }
    }

    fn run_compute_key(&self) {
        let outcome = self.exchange.borrow_mut().compute_key();
        match outcome {
            Ok(KeyOutcome::Established) => {
                tracing::info!(channel = %self.channel, "group key established");
                self.has_new_key.set(true);
                self.event_loop.channel_finished();
            },
            Ok(KeyOutcome::AlreadyDone) => {},
            Ok(KeyOutcome::Mismatch) => {
                tracing::warn!(channel = %self.channel,
                    "right-key chain failed to close; exchange aborted without a key");
            },
            Err(error) => self.fail_exchange("key computation failed", &error),
        }
    }

    fn sign_and_publish(&self, mut msg: RoundMessage) {
        msg.signature = self.credentials.sign(&msg.signed_bytes());
        let round = msg.round;
        let bytes = match Payload::Round(msg).to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                self.fail_exchange("failed to encode round message", &error);
                return;
            },
        };
        if let Err(error) = self.transport.publish(&self.channel.exchange_channel(), &bytes) {
            self.fail_exchange("publish failed", &error);
        } else {
            tracing::trace!(channel = %self.channel, round, "round message dispatched");
        }
    }

    fn fail_exchange(&self, what: &str, error: &dyn std::fmt::Display) {
        tracing::error!(channel = %self.channel, error = %error, "{what}");
        self.exchange.borrow_mut().fail();
    }
}
