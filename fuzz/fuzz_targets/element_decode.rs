//! Fuzz target for group element decoding
//!
//! Arbitrary bytes must either decode to an element in [1, p-1] or return an
//! error; never panic and never produce a zero element.

#![no_main]

use conclave_crypto::ModpGroup;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let group = ModpGroup::modp_4096();
    if let Ok(element) = group.decode(data) {
        assert!(element.bits() > 0, "zero elements must be rejected");
        // Round trip through the minimal encoding.
        let decoded = group.decode(&element.encode()).expect("valid elements re-decode");
        assert_eq!(decoded, element);
    }
});
