//! Encryption groups player shares are encrypted under, looked up by name.

use std::collections::HashMap;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use once_cell::sync::Lazy;

/// A prime-order group used for Diffie-Hellman share encryption.
///
/// Secret keys are canonical curve25519 scalars; public keys are 32-byte
/// encodings in the group's own compressed format.
pub trait EncryptionGroup: Send + Sync {
    /// Registry name, as written into the offchain config.
    fn name(&self) -> &'static str;

    fn public_key(&self, secret: &Scalar) -> [u8; 32];

    /// Whether `bytes` decodes to a usable (non-identity, prime-order) point.
    fn is_valid_public_key(&self, bytes: &[u8; 32]) -> bool;

    /// `secret * public`, or `None` when `public` is not a valid point.
    fn diffie_hellman(&self, secret: &Scalar, public: &[u8; 32]) -> Option<[u8; 32]>;
}

pub struct Ed25519Group;

impl Ed25519Group {
    fn decode(bytes: &[u8; 32]) -> Option<EdwardsPoint> {
        let point = CompressedEdwardsY(*bytes).decompress()?;
        if point.is_small_order() || !point.is_torsion_free() {
            return None;
        }
        Some(point)
    }
}

impl EncryptionGroup for Ed25519Group {
    fn name(&self) -> &'static str {
        ED25519_GROUP
    }

    fn public_key(&self, secret: &Scalar) -> [u8; 32] {
        EdwardsPoint::mul_base(secret).compress().to_bytes()
    }

    fn is_valid_public_key(&self, bytes: &[u8; 32]) -> bool {
        Self::decode(bytes).is_some()
    }

    fn diffie_hellman(&self, secret: &Scalar, public: &[u8; 32]) -> Option<[u8; 32]> {
        Self::decode(public).map(|p| (p * secret).compress().to_bytes())
    }
}

pub struct Ristretto255Group;

impl Ristretto255Group {
    fn decode(bytes: &[u8; 32]) -> Option<RistrettoPoint> {
        let point = CompressedRistretto(*bytes).decompress()?;
        if point.is_identity() {
            return None;
        }
        Some(point)
    }
}

impl EncryptionGroup for Ristretto255Group {
    fn name(&self) -> &'static str {
        RISTRETTO255_GROUP
    }

    fn public_key(&self, secret: &Scalar) -> [u8; 32] {
        RistrettoPoint::mul_base(secret).compress().to_bytes()
    }

    fn is_valid_public_key(&self, bytes: &[u8; 32]) -> bool {
        Self::decode(bytes).is_some()
    }

    fn diffie_hellman(&self, secret: &Scalar, public: &[u8; 32]) -> Option<[u8; 32]> {
        Self::decode(public).map(|p| (p * secret).compress().to_bytes())
    }
}

pub const ED25519_GROUP: &str = "Ed25519";
pub const RISTRETTO255_GROUP: &str = "Ristretto255";

static ENCRYPTION_GROUPS: Lazy<HashMap<&'static str, &'static dyn EncryptionGroup>> =
    Lazy::new(|| {
        let groups: [&'static dyn EncryptionGroup; 2] = [&Ed25519Group, &Ristretto255Group];
        groups.into_iter().map(|g| (g.name(), g)).collect()
    });

/// Look up a registered encryption group by name.
pub fn encryption_group(name: &str) -> Option<&'static dyn EncryptionGroup> {
    ENCRYPTION_GROUPS.get(name).copied()
}

/// Names of every registered encryption group, sorted.
pub fn encryption_group_names() -> Vec<&'static str> {
    let mut names: Vec<_> = ENCRYPTION_GROUPS.keys().copied().collect();
    names.sort_unstable();
    names
}
