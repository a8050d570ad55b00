//! Adversarial delivery: tampered and misauthorized messages are dropped by
//! every honest receiver, and a stalled exchange recovers only through an
//! explicit restart with a fresh epoch.

use std::time::Duration;

use conclave_core::{ExchangeConfig, ExchangeState};
use conclave_harness::{decode_round, encode_round, init_test_logging, Cluster};
use conclave_proto::{RoundMessage, ROUND_ONE, ROUND_TWO};

/// Mutate the first in-flight frame matching `round` with `mutate`, keeping
/// the original signature attached.
fn tamper_first(cluster: &Cluster, round: u8, mutate: impl FnOnce(&mut RoundMessage)) {
    let mut mutate = Some(mutate);
    cluster.with_pending(|queue| {
        for frame in queue.iter_mut() {
            let Some(mut msg) = decode_round(&frame.bytes) else {
                continue;
            };
            if msg.round != round {
                continue;
            }
            if let Some(mutate) = mutate.take() {
                mutate(&mut msg);
                frame.bytes = encode_round(msg);
                break;
            }
        }
    });
    assert!(mutate.is_none(), "no in-flight frame with round {round} found");
}

/// Drive a cohort of 3 to the point where all round-2 broadcasts sit on the
/// bus undelivered.
fn cluster_with_round_two_in_flight(seed: u64) -> Cluster {
    let cluster = Cluster::new(3, seed);
    cluster.run_loops();
    for _ in 0..3 {
        assert!(cluster.deliver_next(), "expected a round-1 frame in flight");
    }
    cluster
}

#[test]
fn tampered_signature_stalls_the_exchange() {
    init_test_logging();
    let cluster = cluster_with_round_two_in_flight(0x5169);

    // One bit of one round-2 signature flips in flight: every receiver
    // (the sender's own loopback included) drops the message, the round-2
    // gate never fires, and no participant fabricates a key.
    tamper_first(&cluster, ROUND_TWO, |msg| msg.signature[0] ^= 0x01);
    cluster.run_to_quiescence();

    assert!(!cluster.all_ready());
    assert!(cluster.session_keys(32).iter().all(Result::is_err), "stall must not yield a key");
    assert!(cluster.take_errors().is_empty(), "authentication failures are silent drops");
}

#[test]
fn tampered_signed_fields_are_dropped() {
    init_test_logging();
    // Each signed field in turn: sender index, round, public value, epoch.
    // Re-signing is impossible for the attacker, so every mutation must be
    // dropped by every receiver and the exchange stalls.
    let mutations: Vec<(&str, fn(&mut RoundMessage))> = vec![
        ("sender index", |msg| msg.u = msg.u % 2 + 1),
        ("round", |msg| msg.round = ROUND_TWO),
        ("public value", |msg| msg.public_value[0] ^= 0x80),
        ("epoch", |msg| msg.d += 1),
    ];

    for (what, mutate) in mutations {
        let cluster = Cluster::new(2, 0xbad);
        cluster.run_loops();
        tamper_first(&cluster, ROUND_ONE, mutate);
        cluster.run_to_quiescence();

        assert!(!cluster.all_ready(), "mutating the {what} must stall the exchange");
        assert!(
            cluster.session_keys(32).iter().all(Result::is_err),
            "mutating the {what} must not yield a key",
        );
    }
}

#[test]
fn misbound_certificate_is_rejected_by_every_receiver() {
    init_test_logging();
    // Participant 2's key is trusted under a URN for a different channel:
    // its signatures are valid but its authorization is not, so all of its
    // messages are dropped and the cohort never completes.
    let cluster = Cluster::with_misbound_party(3, 0x0b0e, 2);
    cluster.run_to_quiescence();

    assert!(!cluster.all_ready());
    assert!(cluster.session_keys(32).iter().all(Result::is_err));
    assert!(cluster.take_errors().is_empty(), "authorization failures are silent drops");
}

#[test]
fn timeout_restarts_with_next_epoch_and_recovers() {
    init_test_logging();
    let config = ExchangeConfig { exchange_timeout: Duration::from_millis(50), ..Default::default() };
    let cluster = Cluster::with_config(2, 0x10af, config);
    cluster.run_loops();

    // Every round-1 broadcast is lost in flight; both participants stall.
    cluster.with_pending(std::collections::VecDeque::clear);
    cluster.arm_timeouts();
    cluster.run_to_quiescence();
    assert!(!cluster.all_ready());
    assert_eq!(cluster.party(1).manager.uid().d, 1);

    // After the deadline the orchestration timers fire, each participant
    // replaces its exchange under epoch 2, and the fresh attempt converges.
    std::thread::sleep(Duration::from_millis(75));
    cluster.run_to_quiescence();

    assert!(cluster.all_ready(), "states: {:?}", cluster.states());
    for party in cluster.parties() {
        assert_eq!(party.manager.uid().d, 2);
        assert_eq!(party.manager.exchange_state(), ExchangeState::KeyReady);
    }
    let keys = cluster.session_keys(32);
    assert_eq!(keys[0].as_ref().unwrap(), keys[1].as_ref().unwrap());
}
