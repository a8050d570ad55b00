//! Fuzz target for Payload::decode
//!
//! Feeds arbitrary byte sequences to the frame decoder to find parser
//! crashes, integer overflows and envelope checks that can be bypassed.
//! The decoder should NEVER panic; invalid input must return an error.

#![no_main]

use conclave_proto::Payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = Payload::decode(data) {
        // Anything that decoded must re-encode and decode to itself.
        let bytes = payload.to_bytes().expect("decoded payloads must re-encode");
        let again = Payload::decode(&bytes).expect("re-encoded payloads must decode");
        assert_eq!(payload, again);
    }
});
