#![warn(missing_docs)]

//! This module defines identifiers of the chordmesh ring.
//!
//! Nodes and keys share one cyclic identifier space of `2^B` points, where `B` is
//! the configured width of an [IdSpace]. A [Did] is a point of that space. It is
//! an arbitrary precision integer, so widths beyond 64 bits are exact.
//!
//! ## Cyclic order
//!
//! There is no total order on a ring, only the question whether a point lies
//! between two others when walking clockwise. [Did::in_range] answers it for the
//! open interval `(begin, end)`. The degenerate interval where `begin == end` is
//! the whole ring, which is what a node without a known predecessor relies on to
//! be responsible for every key.
//!
//! ## Derived identifiers
//!
//! [IdSpace::hash] serializes any value canonically with serde_json, hashes it with
//! SHA-1 and reduces the digest into the space. Node ids and storage keys both come
//! from it, so a key may equal a node id, routing treats both uniformly.

use std::str::FromStr;

use num_bigint::BigUint;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::DEFAULT_ID_BITS;
use crate::consts::MAX_ID_BITS;
use crate::error::Error;
use crate::error::Result;

/// A point of the identifier ring.
#[derive(Clone, Eq, Ord, PartialEq, PartialOrd, Hash, Default)]
pub struct Did(BigUint);

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = &self.0;
        write!(f, "0x{inner:x}")
    }
}

impl std::fmt::Debug for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Did({self})")
    }
}

impl Did {
    /// Test x <- (begin, end) walking clockwise. `begin == end` covers the whole ring.
    pub fn in_range(&self, begin: &Did, end: &Did) -> bool {
        in_range(begin, self, end)
    }

    /// The underlying integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

/// Cyclic open interval membership: whether `id` lies strictly between `begin`
/// and `end` walking clockwise. `begin == end` is the whole ring.
pub fn in_range(begin: &Did, id: &Did, end: &Did) -> bool {
    if begin == end {
        true
    } else if begin > end {
        id > begin || id < end
    } else {
        begin < id && id < end
    }
}

impl From<u32> for Did {
    fn from(id: u32) -> Did {
        Self(BigUint::from(id))
    }
}

impl From<u64> for Did {
    fn from(id: u64) -> Did {
        Self(BigUint::from(id))
    }
}

impl From<BigUint> for Did {
    fn from(n: BigUint) -> Self {
        Self(n)
    }
}

impl From<Did> for BigUint {
    fn from(did: Did) -> BigUint {
        did.0
    }
}

impl FromStr for Did {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if hex.is_empty() {
            return Err(Error::InvalidDid(s.to_string()));
        }
        BigUint::parse_bytes(hex.as_bytes(), 16)
            .map(Self)
            .ok_or_else(|| Error::InvalidDid(s.to_string()))
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Did::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The identifier space of width `bits`, all arithmetic is modulo `2^bits`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSpace {
    bits: u32,
}

impl Default for IdSpace {
    fn default() -> Self {
        Self {
            bits: DEFAULT_ID_BITS,
        }
    }
}

impl IdSpace {
    /// Create a space of `bits` width, within `1..=160`.
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 || bits > MAX_ID_BITS {
            return Err(Error::InvalidIdBits(bits));
        }
        Ok(Self { bits })
    }

    /// Width of the space.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// `2^bits`
    pub fn modulus(&self) -> BigUint {
        BigUint::from(1u8) << self.bits
    }

    /// Reduce any integer into the space.
    pub fn reduce(&self, n: &BigUint) -> Did {
        Did(n % self.modulus())
    }

    /// A random identifier, or `seed` reduced into the space.
    pub fn create(&self, seed: Option<&BigUint>) -> Did {
        match seed {
            Some(seed) => self.reduce(seed),
            None => self.random(),
        }
    }

    /// A uniformly random identifier.
    pub fn random(&self) -> Did {
        let bytes: [u8; 20] = rand::random();
        self.reduce(&BigUint::from_bytes_be(&bytes))
    }

    /// Hash the canonical serialization of `value` into the space.
    pub fn hash<T: Serialize + ?Sized>(&self, value: &T) -> Result<Did> {
        let bytes = serde_json::to_vec(value).map_err(Error::Serialize)?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        Ok(self.reduce(&BigUint::from_bytes_be(&digest)))
    }

    /// `(a + b) mod 2^bits`
    pub fn add(&self, a: &Did, b: &Did) -> Did {
        self.reduce(&(&a.0 + &b.0))
    }

    /// `(a - b) mod 2^bits`
    pub fn sub(&self, a: &Did, b: &Did) -> Did {
        let m = self.modulus();
        Did((&a.0 % &m + &m - &b.0 % &m) % &m)
    }

    /// Clockwise distance from `from` to `to`.
    pub fn distance(&self, from: &Did, to: &Did) -> BigUint {
        self.sub(to, from).0
    }

    /// `(id + 2^offset) mod 2^bits`, the start of the interval covered by finger `offset`.
    pub fn finger_start(&self, id: &Did, offset: usize) -> Did {
        self.reduce(&(&id.0 + (BigUint::from(1u8) << offset)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn did(n: u32) -> Did {
        Did::from(n)
    }

    #[test]
    fn test_in_range() {
        assert!(in_range(&did(10), &did(20), &did(30)));
        assert!(!in_range(&did(10), &did(10), &did(30)));
        assert!(!in_range(&did(10), &did(30), &did(30)));
        assert!(!in_range(&did(10), &did(40), &did(30)));

        // wraps around zero
        assert!(in_range(&did(200), &did(250), &did(10)));
        assert!(in_range(&did(200), &did(0), &did(10)));
        assert!(!in_range(&did(200), &did(100), &did(10)));
        assert!(!in_range(&did(200), &did(200), &did(10)));

        // begin == end is the whole ring
        assert!(in_range(&did(7), &did(7), &did(7)));
        assert!(in_range(&did(7), &did(100), &did(7)));
        assert!(did(100).in_range(&did(7), &did(7)));
    }

    #[test]
    fn test_id_space_bounds() {
        assert!(IdSpace::new(0).is_err());
        assert!(IdSpace::new(161).is_err());
        assert_eq!(IdSpace::new(8).unwrap().modulus(), BigUint::from(256u32));
        assert_eq!(IdSpace::default().bits(), 160);
    }

    #[test]
    fn test_create() {
        let space = IdSpace::new(8).unwrap();
        assert_eq!(space.create(Some(&BigUint::from(300u32))), did(44));
        for _ in 0..100 {
            assert!(space.create(None).as_biguint() < &space.modulus());
        }
    }

    #[test]
    fn test_hash() {
        let space = IdSpace::default();
        let a = space.hash("hello").unwrap();
        assert_eq!(a, space.hash("hello").unwrap());
        assert_ne!(a, space.hash("world").unwrap());
        assert!(a.as_biguint() < &space.modulus());

        let small = IdSpace::new(8).unwrap();
        let b = small.hash("hello").unwrap();
        assert!(b.as_biguint() < &small.modulus());
        assert_eq!(b, small.reduce(a.as_biguint()));
    }

    #[test]
    fn test_finite_ring_arithmetic() {
        let space = IdSpace::new(8).unwrap();
        assert_eq!(space.add(&did(250), &did(10)), did(4));
        assert_eq!(space.sub(&did(4), &did(10)), did(250));
        assert_eq!(space.distance(&did(250), &did(4)), BigUint::from(10u32));
        assert_eq!(space.finger_start(&did(200), 0), did(201));
        assert_eq!(space.finger_start(&did(200), 6), did(8));
        assert_eq!(space.finger_start(&did(200), 7), did(72));

        let wide = IdSpace::default();
        let max = Did::from((BigUint::from(1u8) << 160) - 1u8);
        assert_eq!(wide.finger_start(&max, 0), did(0));
        assert_eq!(wide.sub(&did(0), &did(1)), max);
    }

    #[test]
    fn test_dump_and_load() {
        assert!(Did::from_str("").is_err());
        assert!(Did::from_str("0x").is_err());
        assert!(Did::from_str("0xzz").is_err());

        // Allow omit 0x prefix
        assert_eq!(
            Did::from_str("11E807fcc88dD319270493fB2e822e388Fe36ab0").unwrap(),
            Did::from_str("0x11E807fcc88dD319270493fB2e822e388Fe36ab0").unwrap(),
        );

        let did = Did::from_str("0x11E807fcc88dD319270493fB2e822e388Fe36ab0").unwrap();
        assert_eq!(
            did.to_string(),
            "0x11e807fcc88dd319270493fb2e822e388fe36ab0"
        );
        assert_eq!(
            serde_json::to_string(&did).unwrap(),
            "\"0x11e807fcc88dd319270493fb2e822e388fe36ab0\""
        );
        assert_eq!(
            serde_json::from_str::<Did>("\"0x11e807fcc88dd319270493fb2e822e388fe36ab0\"").unwrap(),
            did
        );
        assert_eq!(
            format!("{:?}", Did::from(200u32)),
            "Did(0xc8)"
        );
    }
}
