//! Message signing, verification and channel authorization.
//!
//! Every protocol message is signed by its sender and checked by every
//! receiver against the credential that the expected authorization URN
//! resolves to. The URN binds a credential to a channel and a ring index, so
//! a valid signature from the wrong participant slot fails authorization just
//! like a forged one.
//!
//! Certificate loading and root-CA chain validation live outside this crate;
//! a [`CredentialStore`] is assumed to contain only credentials that already
//! passed trust checks. [`MemoryCredentialStore`] is the in-process
//! implementation used by production wiring (fed from the certificate
//! loader) and by tests (fed with synthetic keys).

use std::collections::HashMap;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};

/// Capability to sign outgoing messages and authenticate incoming ones.
///
/// `verify` is strictly boolean. Callers treat `false` as "drop the message";
/// the reason (unknown URN, malformed signature, wrong key) is deliberately
/// not distinguishable, so authentication failures can never be confused
/// with protocol-format errors.
pub trait CredentialStore {
    /// Sign the canonical byte layout of a message with the local key.
    fn sign(&self, canonical: &[u8]) -> Vec<u8>;

    /// Check `signature` over `canonical` against the credential authorized
    /// for `expected_urn`. Returns `true` iff the URN resolves to a trusted
    /// credential and the signature verifies under it.
    fn verify(&self, expected_urn: &str, canonical: &[u8], signature: &[u8]) -> bool;
}

/// In-memory credential store over Ed25519 keys.
pub struct MemoryCredentialStore {
    signing_key: SigningKey,
    trusted: HashMap<String, VerifyingKey>,
}

impl MemoryCredentialStore {
    /// Build a store around an existing local signing key.
    #[must_use]
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key, trusted: HashMap::new() }
    }

    /// Generate a fresh local signing key from the given CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(SigningKey::generate(rng))
    }

    /// The public half of the local signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Authorize `key` for `urn`. Replaces any previous entry for that URN.
    pub fn trust(&mut self, urn: impl Into<String>, key: VerifyingKey) {
        self.trusted.insert(urn.into(), key);
    }

    /// Number of trusted credentials.
    #[must_use]
    pub fn trusted_len(&self) -> usize {
        self.trusted.len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn sign(&self, canonical: &[u8]) -> Vec<u8> {
        self.signing_key.sign(canonical).to_bytes().to_vec()
    }

    fn verify(&self, expected_urn: &str, canonical: &[u8], signature: &[u8]) -> bool {
        let Some(key) = self.trusted.get(expected_urn) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(canonical, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    const URN: &str = "urn:lcmsec:gkexchg:239.255.76.67:7667:clock:1";

    fn store_pair() -> (MemoryCredentialStore, MemoryCredentialStore) {
        let mut rng = StdRng::seed_from_u64(1);
        let alice = MemoryCredentialStore::generate(&mut rng);
        let mut bob = MemoryCredentialStore::generate(&mut rng);
        bob.trust(URN, alice.verifying_key());
        (alice, bob)
    }

    #[test]
    fn signed_messages_verify() {
        let (alice, bob) = store_pair();
        let canonical = b"canonical message bytes";
        let sig = alice.sign(canonical);
        assert!(bob.verify(URN, canonical, &sig));
    }

    #[test]
    fn tampered_bytes_fail() {
        let (alice, bob) = store_pair();
        let sig = alice.sign(b"canonical message bytes");
        assert!(!bob.verify(URN, b"canonical message bytez", &sig));
    }

    #[test]
    fn tampered_signature_fails() {
        let (alice, bob) = store_pair();
        let canonical = b"canonical message bytes";
        let mut sig = alice.sign(canonical);
        sig[0] ^= 0x01;
        assert!(!bob.verify(URN, canonical, &sig));
    }

    #[test]
    fn truncated_signature_fails() {
        let (alice, bob) = store_pair();
        let canonical = b"canonical message bytes";
        let sig = alice.sign(canonical);
        assert!(!bob.verify(URN, canonical, &sig[..32]));
    }

    #[test]
    fn unknown_urn_fails() {
        let (alice, bob) = store_pair();
        let canonical = b"canonical message bytes";
        let sig = alice.sign(canonical);
        assert!(!bob.verify("urn:lcmsec:gkexchg:239.255.76.67:7667:clock:2", canonical, &sig));
    }

    #[test]
    fn urn_binds_the_key_not_just_the_name() {
        // A valid signature from a key trusted under a DIFFERENT urn must not
        // authorize this one.
        let mut rng = StdRng::seed_from_u64(2);
        let alice = MemoryCredentialStore::generate(&mut rng);
        let mallory = MemoryCredentialStore::generate(&mut rng);
        let mut bob = MemoryCredentialStore::generate(&mut rng);
        bob.trust(URN, alice.verifying_key());
        bob.trust("urn:lcmsec:gkexchg:239.255.76.67:7667:clock:3", mallory.verifying_key());

        let canonical = b"canonical message bytes";
        let sig = mallory.sign(canonical);
        assert!(!bob.verify(URN, canonical, &sig));
    }
}
