//! A simulated cohort of key exchange participants.
//!
//! Every participant gets its own event loop, its own seeded RNG and a
//! credential store that trusts every cohort member's synthetic key under
//! the correct authorization URN. All participants share one [`Bus`].
//!
//! Determinism: identical `(participants, seed)` pairs reproduce identical
//! private exponents and therefore identical shared secrets, which lets
//! tests compare outcomes across differently-ordered runs of the same
//! cluster.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use conclave_core::{
    ChannelBinding, ChannelManager, EventLoop, ExchangeConfig, ExchangeError, ExchangeState,
    ManagerError, PartyId,
};
use conclave_crypto::MemoryCredentialStore;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bus::{Bus, BusTransport, InFlight};

/// One simulated participant.
pub struct Party {
    /// The participant's event loop.
    pub event_loop: Rc<EventLoop>,
    /// The participant's channel manager.
    pub manager: Rc<ChannelManager<BusTransport, MemoryCredentialStore, StdRng>>,
}

/// A cohort wired to a shared in-memory bus.
pub struct Cluster {
    bus: Rc<Bus>,
    parties: Vec<Party>,
    errors: RefCell<Vec<(u32, ManagerError)>>,
}

impl Cluster {
    /// Cohort of `participants` on the default test channel.
    #[must_use]
    pub fn new(participants: u32, seed: u64) -> Self {
        Self::build(participants, seed, ExchangeConfig::default(), None)
    }

    /// Cohort with custom orchestration timing.
    #[must_use]
    pub fn with_config(participants: u32, seed: u64, config: ExchangeConfig) -> Self {
        Self::build(participants, seed, config, None)
    }

    /// Cohort in which `misbound_u`'s key is trusted under a URN for the
    /// wrong channel, so its messages fail authorization everywhere.
    #[must_use]
    pub fn with_misbound_party(participants: u32, seed: u64, misbound_u: u32) -> Self {
        Self::build(participants, seed, ExchangeConfig::default(), Some(misbound_u))
    }

    fn build(
        participants: u32,
        seed: u64,
        config: ExchangeConfig,
        misbound_u: Option<u32>,
    ) -> Self {
        let channel = ChannelBinding::named("239.255.76.67:7667", "clock");
        let wrong_channel = ChannelBinding::named("239.255.76.67:7667", "detour");

        let mut key_rng = StdRng::seed_from_u64(seed);
        let mut stores: Vec<MemoryCredentialStore> =
            (1..=participants).map(|_| MemoryCredentialStore::generate(&mut key_rng)).collect();
        let keys: Vec<_> = stores.iter().map(MemoryCredentialStore::verifying_key).collect();
        for store in stores.iter_mut() {
            for (idx, key) in keys.iter().enumerate() {
                let u = idx as u32 + 1;
                let urn = if misbound_u == Some(u) {
                    wrong_channel.authorization_urn(u)
                } else {
                    channel.authorization_urn(u)
                };
                store.trust(urn, *key);
            }
        }

        let bus = Bus::new();
        let parties = stores
            .into_iter()
            .enumerate()
            .map(|(idx, store)| {
                let u = idx as u32 + 1;
                let event_loop = Rc::new(EventLoop::new());
                let manager = ChannelManager::new(
                    channel.clone(),
                    PartyId { u, d: 1 },
                    participants,
                    config.clone(),
                    Rc::clone(&event_loop),
                    Rc::new(BusTransport::new(Rc::clone(&bus))),
                    Rc::new(store),
                    StdRng::seed_from_u64(seed ^ (u64::from(u) << 32)),
                )
                .expect("invariant: cluster parameters are valid");
                Party { event_loop, manager }
            })
            .collect();

        Self { bus, parties, errors: RefCell::new(Vec::new()) }
    }

    /// Participant with ring index `u` (1-based).
    #[must_use]
    pub fn party(&self, u: u32) -> &Party {
        &self.parties[u as usize - 1]
    }

    /// All participants in ring order.
    #[must_use]
    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    /// The shared bus.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Run every event loop once. After construction this publishes the
    /// round-1 broadcasts without delivering anything.
    pub fn run_loops(&self) {
        for party in &self.parties {
            party.event_loop.run_pending();
        }
    }

    /// Arm the exchange timeout on every participant.
    pub fn arm_timeouts(&self) {
        for party in &self.parties {
            party.manager.arm_timeout();
        }
    }

    /// Deliver the next in-flight frame to every participant (loopback
    /// included) and run all loops. Returns `false` when the bus was empty.
    pub fn deliver_next(&self) -> bool {
        let Some(frame) = self.bus.pop() else {
            return false;
        };
        tracing::trace!(channel = %frame.channel, len = frame.bytes.len(), "delivering frame to cohort");
        for party in &self.parties {
            if let Err(error) = party.manager.handle_message(&frame.channel, &frame.bytes) {
                self.errors.borrow_mut().push((party.manager.uid().u, error));
            }
        }
        self.run_loops();
        true
    }

    /// Run loops and deliver frames until the bus is drained and no loop has
    /// ready work. Timers that are not yet due stay queued.
    pub fn run_to_quiescence(&self) {
        self.run_loops();
        while self.deliver_next() {}
    }

    /// Mutate the in-flight queue (reorder, drop, tamper, inject).
    pub fn with_pending(&self, f: impl FnOnce(&mut VecDeque<InFlight>)) {
        self.bus.with_pending(f);
    }

    /// Handler errors collected during delivery, draining the buffer.
    pub fn take_errors(&self) -> Vec<(u32, ManagerError)> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    /// Exchange states of all participants, in ring order.
    #[must_use]
    pub fn states(&self) -> Vec<ExchangeState> {
        self.parties.iter().map(|p| p.manager.exchange_state()).collect()
    }

    /// True once every participant reached `key_ready`.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.parties.iter().all(|p| p.manager.exchange_state() == ExchangeState::KeyReady)
    }

    /// Session keys of all participants, in ring order.
    pub fn session_keys(&self, len: usize) -> Vec<Result<Vec<u8>, ExchangeError>> {
        self.parties.iter().map(|p| p.manager.session_key(len)).collect()
    }
}
