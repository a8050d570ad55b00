//! Cryptographic building blocks for the conclave key agreement.
//!
//! Three concerns live here, all free of protocol state:
//!
//! - [`modp`]: the fixed RFC 3526 4096-bit modular group and its arithmetic —
//!   private exponent sampling, modular exponentiation, inversion, and the
//!   minimal big-endian element codec used on the wire.
//! - [`kdf`]: derivation of symmetric session keys from the agreed group
//!   secret.
//! - [`credentials`]: signing and verification of protocol messages, with
//!   authorization decided by the certificate attribute (URN) that binds a
//!   signer to a channel and ring index.
//!
//! # Security
//!
//! - The group is fixed and well-known; peers never negotiate parameters.
//! - Private exponents are sampled uniformly from `[2, p-2]` with a
//!   caller-provided CSPRNG, so deterministic tests inject seeded generators
//!   and production injects an OS-backed one.
//! - Verification is strictly boolean: a failed lookup, a malformed
//!   signature and a wrong signature are indistinguishable to the caller,
//!   which drops the message either way.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod credentials;
pub mod kdf;
pub mod modp;

pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use kdf::derive_session_key;
pub use modp::{DhScalar, GroupElement, GroupError, ModpGroup};
