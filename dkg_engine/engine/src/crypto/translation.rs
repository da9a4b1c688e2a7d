//! Point translation between the group library's representation of the
//! shared public key and the representation the on-chain contract stores.

use std::collections::HashMap;

use curve25519_dalek::edwards::EdwardsPoint;
use once_cell::sync::Lazy;

pub trait PointTranslation: Send + Sync {
    /// Registry name, as written into the offchain config.
    fn name(&self) -> &'static str;

    /// Encode a shared public key the way the contract expects it.
    fn translate(&self, key: &EdwardsPoint) -> Vec<u8>;
}

/// Compressed Edwards `y` coordinate with the sign bit (RFC 8032 encoding).
pub struct CompressedEdwardsTranslation;

impl PointTranslation for CompressedEdwardsTranslation {
    fn name(&self) -> &'static str {
        COMPRESSED_EDWARDS
    }

    fn translate(&self, key: &EdwardsPoint) -> Vec<u8> {
        key.compress().to_bytes().to_vec()
    }
}

/// Montgomery `u` coordinate, as consumed by X25519 verifiers.
pub struct MontgomeryTranslation;

impl PointTranslation for MontgomeryTranslation {
    fn name(&self) -> &'static str {
        MONTGOMERY_U
    }

    fn translate(&self, key: &EdwardsPoint) -> Vec<u8> {
        key.to_montgomery().to_bytes().to_vec()
    }
}

pub const COMPRESSED_EDWARDS: &str = "ed25519-compressed";
pub const MONTGOMERY_U: &str = "x25519-montgomery";

static TRANSLATORS: Lazy<HashMap<&'static str, &'static dyn PointTranslation>> = Lazy::new(|| {
    let translators: [&'static dyn PointTranslation; 2] =
        [&CompressedEdwardsTranslation, &MontgomeryTranslation];
    translators.into_iter().map(|t| (t.name(), t)).collect()
});

pub fn translator(name: &str) -> Option<&'static dyn PointTranslation> {
    TRANSLATORS.get(name).copied()
}

/// Names of every registered translator, sorted.
pub fn translator_names() -> Vec<&'static str> {
    let mut names: Vec<_> = TRANSLATORS.keys().copied().collect();
    names.sort_unstable();
    names
}
