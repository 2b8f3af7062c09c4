//! Schnorr keys and signatures over secp256k1.
//!
//! Public keys are 33-byte SEC1 compressed points; signatures are the
//! 64-byte concatenation of the 32-byte challenge scalar and the 32-byte
//! response scalar. The challenge binds the commitment point, the public
//! key, and the message: `e = H(Q ‖ P ‖ m)` with Keccak-256.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash as StdHash, Hasher};

use k256::{
    elliptic_curve::{
        group::Group,
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256,
};
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

use crate::{CryptoError, Result};

/// Size in bytes of a compressed public key.
pub const PUB_KEY_SIZE: usize = 33;

/// Size in bytes of a signature.
pub const SIGNATURE_SIZE: usize = 64;

/// A compressed secp256k1 public key.
#[derive(Clone)]
pub struct PubKey {
    point: ProjectivePoint,
    bytes: [u8; PUB_KEY_SIZE],
}

impl PubKey {
    /// Parse a 33-byte SEC1 compressed point.
    pub fn from_bytes(bytes: &[u8; PUB_KEY_SIZE]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let affine_opt = AffinePoint::from_encoded_point(&encoded);
        if affine_opt.is_none().into() {
            return Err(CryptoError::InvalidPublicKey(
                "not a point on the curve".to_string(),
            ));
        }
        Ok(Self {
            point: ProjectivePoint::from(affine_opt.unwrap()),
            bytes: *bytes,
        })
    }

    /// Parse from an arbitrary slice; must be exactly 33 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUB_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("{} bytes", bytes.len())))?;
        Self::from_bytes(&arr)
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.bytes
    }

    /// The compressed encoding as an owned array.
    pub fn to_bytes(&self) -> [u8; PUB_KEY_SIZE] {
        self.bytes
    }

    /// Verify `signature` over `message` under this key.
    ///
    /// Returns `false` on any parse failure or equation mismatch; never
    /// panics on attacker-controlled input.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let e = match parse_scalar(&signature.challenge) {
            Some(s) => s,
            None => return false,
        };
        let s = match parse_scalar(&signature.response) {
            Some(s) => s,
            None => return false,
        };
        if bool::from(e.is_zero()) || bool::from(s.is_zero()) {
            return false;
        }

        // Q' = s*G + e*P
        let q = ProjectivePoint::GENERATOR * s + self.point * e;
        if bool::from(q.is_identity()) {
            return false;
        }

        let expected = compute_challenge(&q, &self.bytes, message);
        expected == e
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey(0x{})", hex::encode(self.bytes))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.bytes[..8]))
    }
}

impl PartialEq for PubKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PubKey {}

// Committee order is the byte order of the compressed encoding.
impl PartialOrd for PubKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PubKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl StdHash for PubKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

/// A Schnorr signature: 32-byte challenge followed by 32-byte response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Challenge scalar `e`.
    pub challenge: [u8; 32],
    /// Response scalar `s`.
    pub response: [u8; 32],
}

impl Signature {
    /// Split a 64-byte wire encoding into a signature.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Self {
        let mut challenge = [0u8; 32];
        let mut response = [0u8; 32];
        challenge.copy_from_slice(&bytes[..32]);
        response.copy_from_slice(&bytes[32..]);
        Self {
            challenge,
            response,
        }
    }

    /// The 64-byte wire encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let mut out = [0u8; SIGNATURE_SIZE];
        out[..32].copy_from_slice(&self.challenge);
        out[32..].copy_from_slice(&self.response);
        out
    }
}

/// A secp256k1 secret key with its cached public key.
#[derive(Clone)]
pub struct SecretKey {
    scalar: Scalar,
    public: PubKey,
}

impl SecretKey {
    /// Generate a random key pair.
    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    /// Generate a key pair from the provided RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Derive a key pair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let digest = crate::keccak256(seed);
        let scalar = <Scalar as Reduce<U256>>::reduce_bytes(&digest.into());
        let scalar = if bool::from(scalar.is_zero()) {
            Scalar::ONE
        } else {
            scalar
        };
        Self::from_scalar(scalar)
    }

    fn from_scalar(scalar: Scalar) -> Self {
        let point = ProjectivePoint::GENERATOR * scalar;
        let bytes = compress(&point);
        Self {
            scalar,
            public: PubKey { point, bytes },
        }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> &PubKey {
        &self.public
    }

    /// Sign `message` with a deterministic nonce.
    pub fn sign(&self, message: &[u8]) -> Signature {
        // k = H("shardnet.schnorr.nonce" || x || m), never reused across
        // messages, never zero.
        let mut hasher = Keccak256::new();
        hasher.update(b"shardnet.schnorr.nonce");
        hasher.update(self.scalar.to_bytes());
        hasher.update(message);
        let digest: [u8; 32] = hasher.finalize().into();
        let k = <Scalar as Reduce<U256>>::reduce_bytes(&digest.into());
        let k = if bool::from(k.is_zero()) {
            Scalar::ONE
        } else {
            k
        };

        let q = ProjectivePoint::GENERATOR * k;
        let e = compute_challenge(&q, &self.public.bytes, message);
        let s = k - e * self.scalar;

        Signature {
            challenge: e.to_bytes().into(),
            response: s.to_bytes().into(),
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the scalar.
        write!(f, "SecretKey(pub = {})", self.public)
    }
}

fn compress(point: &ProjectivePoint) -> [u8; PUB_KEY_SIZE] {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut out = [0u8; PUB_KEY_SIZE];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn parse_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    let repr = (*bytes).into();
    let opt = Scalar::from_repr(repr);
    if bool::from(opt.is_some()) {
        Some(opt.unwrap())
    } else {
        None
    }
}

// e = H(compress(Q) || P || m) reduced into the scalar field.
fn compute_challenge(q: &ProjectivePoint, pubkey: &[u8; PUB_KEY_SIZE], message: &[u8]) -> Scalar {
    let mut hasher = Keccak256::new();
    hasher.update(compress(q));
    hasher.update(pubkey);
    hasher.update(message);
    let digest: [u8; 32] = hasher.finalize().into();
    <Scalar as Reduce<U256>>::reduce_bytes(&digest.into())
}
