//! Arithmetic in the RFC 3526 4096-bit modular group.
//!
//! All protocol values are elements of `Z_p^*` for the well-known 4096-bit
//! MODP prime (group id 16), generator 2. The parameters are constants; they
//! are never generated or negotiated.
//!
//! Elements are kept strictly in `[1, p-1]`. Zero is not a group element, and
//! the decoder refuses it, so downstream code can use `Option`/`Result` for
//! absence instead of sentinel zeros.
//!
//! num-bigint's `modpow` is not constant-time; this is the best the bignum
//! backend offers and is accepted as a limitation.

use std::fmt;
use std::sync::OnceLock;

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// RFC 3526, section 5 — 4096-bit MODP group prime.
const MODP_4096_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AAAC42DAD33170D04507A33A85521ABDF1CBA64",
    "ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6B",
    "F12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB31",
    "43DB5BFCE0FD108E4B82D120A92108011A723C12A787E6D7",
    "88719A10BDBA5B2699C327186AF4E23C1A946834B6150BDA",
    "2583E9CA2AD44CE8DBBBC2DB04DE8EF92E8EFC141FBECAA6",
    "287C59474E6BC05D99B2964FA090C3A2233BA186515BE7ED",
    "1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA9",
    "93B4EA988D8FDDC186FFB7DC90A6C08F4DF435C934063199",
    "FFFFFFFFFFFFFFFF",
);

/// Byte length of a 4096-bit element; encodings are never longer.
const MODP_4096_ELEMENT_LEN: usize = 512;

/// Errors from element decoding and group arithmetic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// Encoded element was zero (zero is not a member of `Z_p^*`).
    #[error("zero is not a group element")]
    ZeroElement,

    /// Encoded element was `>= p`.
    #[error("encoded element out of range [1, p-1]")]
    OutOfRange,

    /// Encoded element longer than any group member can be.
    #[error("encoded element too long: {len} bytes exceeds {max}")]
    ElementTooLong {
        /// Bytes received.
        len: usize,
        /// Maximum element encoding length.
        max: usize,
    },

    /// No modular inverse exists.
    #[error("element has no inverse modulo p")]
    NotInvertible,
}

/// A private exponent in `[2, p-2]`.
///
/// Only [`ModpGroup::random_scalar`] constructs these, so a scalar in the
/// wild is always in range. The value intentionally has no encoding: private
/// exponents never leave the process.
#[derive(Clone, PartialEq, Eq)]
pub struct DhScalar(BigUint);

impl fmt::Debug for DhScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the exponent.
        write!(f, "DhScalar({} bits)", self.0.bits())
    }
}

/// An element of `Z_p^*`, kept in `[1, p-1]` by construction.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupElement(BigUint);

impl GroupElement {
    /// The multiplicative identity.
    #[must_use]
    pub fn one() -> Self {
        Self(BigUint::one())
    }

    /// Minimal big-endian encoding (no leading zero bytes).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    /// Bit length of the element.
    #[must_use]
    pub fn bits(&self) -> u64 {
        self.0.bits()
    }
}

impl fmt::Debug for GroupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupElement({} bits)", self.0.bits())
    }
}

/// The fixed modular group `(p, g)`.
pub struct ModpGroup {
    p: BigUint,
    g: BigUint,
    element_len: usize,
}

impl ModpGroup {
    /// The process-wide RFC 3526 4096-bit group.
    pub fn modp_4096() -> &'static Self {
        static GROUP: OnceLock<ModpGroup> = OnceLock::new();
        GROUP.get_or_init(|| {
            let p = BigUint::parse_bytes(MODP_4096_PRIME_HEX.as_bytes(), 16)
                .expect("invariant: RFC 3526 prime constant parses");
            ModpGroup { p, g: BigUint::from(2u32), element_len: MODP_4096_ELEMENT_LEN }
        })
    }

    /// The group prime `p`.
    #[must_use]
    pub fn prime(&self) -> &BigUint {
        &self.p
    }

    /// Sample a private exponent uniformly from `[2, p-2]`.
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> DhScalar {
        let low = BigUint::from(2u32);
        let high = &self.p - BigUint::one(); // exclusive, so the maximum is p-2
        DhScalar(rng.gen_biguint_range(&low, &high))
    }

    /// `g^e mod p`.
    #[must_use]
    pub fn generator_pow(&self, e: &DhScalar) -> GroupElement {
        GroupElement(self.g.modpow(&e.0, &self.p))
    }

    /// `base^e mod p`.
    #[must_use]
    pub fn pow(&self, base: &GroupElement, e: &DhScalar) -> GroupElement {
        GroupElement(base.0.modpow(&e.0, &self.p))
    }

    /// `a · b mod p`.
    #[must_use]
    pub fn mul(&self, a: &GroupElement, b: &GroupElement) -> GroupElement {
        GroupElement((&a.0 * &b.0) % &self.p)
    }

    /// Modular inverse of `a`, by the extended Euclidean algorithm.
    ///
    /// The Bézout coefficient is computed over signed integers and folded
    /// back into `[0, p)`.
    ///
    /// # Errors
    ///
    /// [`GroupError::NotInvertible`] — unreachable for elements of `Z_p^*`
    /// with prime `p`, but kept as an error rather than a panic.
    pub fn inverse(&self, a: &GroupElement) -> Result<GroupElement, GroupError> {
        let value = BigInt::from(a.0.clone());
        let modulus = BigInt::from(self.p.clone());
        let ext = value.extended_gcd(&modulus);
        if !ext.gcd.is_one() {
            return Err(GroupError::NotInvertible);
        }
        let inverse = ext
            .x
            .mod_floor(&modulus)
            .to_biguint()
            .expect("invariant: mod_floor by a positive modulus is non-negative");
        Ok(GroupElement(inverse))
    }

    /// Decode a minimal big-endian element, enforcing `1 <= v < p`.
    ///
    /// # Errors
    ///
    /// - [`GroupError::ElementTooLong`] before parsing oversized input
    /// - [`GroupError::ZeroElement`] for empty or all-zero input
    /// - [`GroupError::OutOfRange`] for `v >= p`
    pub fn decode(&self, bytes: &[u8]) -> Result<GroupElement, GroupError> {
        if bytes.len() > self.element_len {
            return Err(GroupError::ElementTooLong { len: bytes.len(), max: self.element_len });
        }
        let v = BigUint::from_bytes_be(bytes);
        if v.is_zero() {
            return Err(GroupError::ZeroElement);
        }
        if v >= self.p {
            return Err(GroupError::OutOfRange);
        }
        Ok(GroupElement(v))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn scalar(v: u64) -> DhScalar {
        DhScalar(BigUint::from(v))
    }

    #[test]
    fn prime_has_4096_bits() {
        let group = ModpGroup::modp_4096();
        assert_eq!(group.prime().bits(), 4096);
        // p is odd and ends in the well-known trailing ff bytes.
        assert_eq!(group.prime().to_bytes_be()[511], 0xff);
    }

    #[test]
    fn generator_small_powers() {
        let group = ModpGroup::modp_4096();
        assert_eq!(group.generator_pow(&scalar(1)).encode(), vec![2]);
        assert_eq!(group.generator_pow(&scalar(10)).encode(), vec![0x04, 0x00]);
    }

    #[test]
    fn pow_commutes_like_dh() {
        let group = ModpGroup::modp_4096();
        let (a, b) = (scalar(0x1234_5678_9abc), scalar(0xfeed_f00d));
        let left = group.pow(&group.generator_pow(&a), &b);
        let right = group.pow(&group.generator_pow(&b), &a);
        assert_eq!(left, right);
    }

    #[test]
    fn inverse_cancels() {
        let group = ModpGroup::modp_4096();
        let x = group.generator_pow(&scalar(0xdead_beef));
        let inv = group.inverse(&x).unwrap();
        assert_eq!(group.mul(&x, &inv), GroupElement::one());
    }

    #[test]
    fn inverse_fixed_points() {
        // 1 and p-1 are the only self-inverse elements of Z_p^*.
        let group = ModpGroup::modp_4096();
        let one = GroupElement::one();
        assert_eq!(group.inverse(&one).unwrap(), one);

        let p_minus_one = group.decode(&(group.prime() - BigUint::one()).to_bytes_be()).unwrap();
        assert_eq!(group.inverse(&p_minus_one).unwrap(), p_minus_one);
    }

    #[test]
    fn random_scalars_stay_in_range() {
        let group = ModpGroup::modp_4096();
        let mut rng = StdRng::seed_from_u64(11);
        let low = BigUint::from(2u32);
        let high = group.prime() - BigUint::from(2u32);
        for _ in 0..8 {
            let s = group.random_scalar(&mut rng);
            assert!(s.0 >= low && s.0 <= high);
        }
    }

    #[test]
    fn random_scalars_are_seed_deterministic() {
        let group = ModpGroup::modp_4096();
        let a = group.random_scalar(&mut StdRng::seed_from_u64(7));
        let b = group.random_scalar(&mut StdRng::seed_from_u64(7));
        let c = group.random_scalar(&mut StdRng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn encode_decode_round_trips() {
        let group = ModpGroup::modp_4096();
        let x = group.generator_pow(&scalar(0xabcdef));
        let decoded = group.decode(&x.encode()).unwrap();
        assert_eq!(decoded, x);
    }

    #[test]
    fn encoding_is_minimal() {
        let group = ModpGroup::modp_4096();
        // 2^8 = 256 = [0x01, 0x00]: no leading zero byte.
        assert_eq!(group.generator_pow(&scalar(8)).encode(), vec![0x01, 0x00]);
    }

    #[test]
    fn decode_rejects_zero() {
        let group = ModpGroup::modp_4096();
        assert_eq!(group.decode(&[]), Err(GroupError::ZeroElement));
        assert_eq!(group.decode(&[0, 0, 0]), Err(GroupError::ZeroElement));
    }

    #[test]
    fn decode_rejects_out_of_range() {
        let group = ModpGroup::modp_4096();
        let p_bytes = group.prime().to_bytes_be();
        assert_eq!(group.decode(&p_bytes), Err(GroupError::OutOfRange));

        let p_minus_one = (group.prime() - BigUint::one()).to_bytes_be();
        assert!(group.decode(&p_minus_one).is_ok());
    }

    #[test]
    fn decode_rejects_oversized_input() {
        let group = ModpGroup::modp_4096();
        let too_long = vec![0x01; MODP_4096_ELEMENT_LEN + 1];
        assert!(matches!(group.decode(&too_long), Err(GroupError::ElementTooLong { .. })));
    }

    #[test]
    fn products_never_vanish() {
        // Elements of Z_p^* are closed under multiplication; a vanishing
        // product would mean a zero operand slipped through decoding.
        let group = ModpGroup::modp_4096();
        let a = group.generator_pow(&scalar(3));
        let b = group.generator_pow(&scalar(5));
        assert!(!group.mul(&a, &b).0.is_zero());
    }
}
