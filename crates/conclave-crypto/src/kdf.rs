//! Session key derivation from the agreed group secret.
//!
//! Counter-mode derivation over SHA-256: block `i` is
//! `SHA-256(secret ‖ counter_be32 ‖ len_be64)`, blocks are concatenated and
//! truncated to the requested length. Binding the requested length into every
//! block makes outputs of different lengths unrelated streams — a 16-byte key
//! is NOT a prefix of the 32-byte key derived from the same secret, so
//! handing out keys of several lengths never hands out prefixes of each
//! other.

use sha2::{Digest, Sha256};

/// Derive `len` bytes of session key material from the encoded group secret.
///
/// Deterministic: equal `(secret, len)` inputs always produce equal output,
/// so every participant that agreed on the secret derives identical keys.
#[must_use]
pub fn derive_session_key(secret: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter: u32 = 1;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(counter.to_be_bytes());
        hasher.update((len as u64).to_be_bytes());
        let block = hasher.finalize();
        let take = usize::min(block.len(), len - out.len());
        out.extend_from_slice(&block[..take]);
        counter += 1;
    }
    out
}
