//! Honest-cohort convergence: every participant derives the same secret.

use conclave_harness::{init_test_logging, Cluster};

#[test]
fn two_party_cohort_converges() {
    init_test_logging();
    let cluster = Cluster::new(2, 0xa11ce);
    cluster.run_to_quiescence();

    assert!(cluster.all_ready());
    let keys = cluster.session_keys(32);
    let reference = keys[0].as_ref().unwrap();
    assert_eq!(keys[1].as_ref().unwrap(), reference);
    assert!(cluster.take_errors().is_empty());
}

#[test]
fn four_party_cohort_converges() {
    init_test_logging();
    let cluster = Cluster::new(4, 0xb0b);
    cluster.run_to_quiescence();

    assert!(cluster.all_ready(), "states: {:?}", cluster.states());
    let keys = cluster.session_keys(32);
    let reference = keys[0].as_ref().unwrap();
    for key in &keys[1..] {
        assert_eq!(key.as_ref().unwrap(), reference);
    }
}

#[test]
fn cohorts_up_to_eight_converge() {
    init_test_logging();
    for participants in 2..=8 {
        let cluster = Cluster::new(participants, 0xfeed ^ u64::from(participants));
        cluster.run_to_quiescence();

        assert!(cluster.all_ready(), "cohort of {participants} stalled: {:?}", cluster.states());
        let keys = cluster.session_keys(32);
        let reference = keys[0].as_ref().unwrap();
        for key in &keys[1..] {
            assert_eq!(key.as_ref().unwrap(), reference, "cohort of {participants} diverged");
        }
    }
}

#[test]
fn sixteen_party_cohort_converges() {
    init_test_logging();
    let cluster = Cluster::new(16, 0x5eed);
    cluster.run_to_quiescence();

    assert!(cluster.all_ready(), "states: {:?}", cluster.states());
    let keys = cluster.session_keys(32);
    let reference = keys[0].as_ref().unwrap();
    for key in &keys[1..] {
        assert_eq!(key.as_ref().unwrap(), reference);
    }
}

#[test]
fn has_new_key_reports_success_exactly_once() {
    let cluster = Cluster::new(2, 0x0ddba11);
    let party = cluster.party(1);
    assert!(!party.manager.has_new_key(), "no key before the exchange ran");

    cluster.run_to_quiescence();
    assert!(party.manager.has_new_key());
    assert!(!party.manager.has_new_key(), "the success flag is one-shot");
    // The key itself stays available.
    assert!(party.manager.session_key(32).is_ok());
}

#[test]
fn each_loop_signals_channel_finished() {
    let cluster = Cluster::new(3, 0xcafe);
    cluster.run_to_quiescence();
    for party in cluster.parties() {
        assert_eq!(party.event_loop.finished_channels(), 1);
    }
}

#[test]
fn session_keys_of_different_lengths_are_unrelated() {
    let cluster = Cluster::new(2, 0xdecaf);
    cluster.run_to_quiescence();

    let k16 = cluster.party(1).manager.session_key(16).unwrap();
    let k32 = cluster.party(2).manager.session_key(32).unwrap();
    // Same secret on both parties, yet the 16-byte key is not a prefix of
    // the 32-byte key.
    assert_eq!(cluster.party(2).manager.session_key(16).unwrap(), k16);
    assert_ne!(&k32[..16], &k16[..]);
}
