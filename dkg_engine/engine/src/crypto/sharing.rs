//! Feldman-style dealing primitives: secret polynomials, public commitments,
//! and per-recipient share encryption.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::groups::EncryptionGroup;
use crate::error::DkgError;
use crate::types::{ConfigDigest, KeyId, PlayerIdx};

const SHARE_KDF_CONTEXT: &str = "dkg-engine 2024 share encryption v1";

/// Secret polynomial of a dealer. Coefficients are wiped on drop.
pub struct Polynomial(Vec<Scalar>);

impl Polynomial {
    /// Random polynomial of the given degree (`degree + 1` coefficients).
    pub fn random<R: CryptoRngCore + ?Sized>(degree: usize, rng: &mut R) -> Self {
        Polynomial((0..=degree).map(|_| Scalar::random(&mut *rng)).collect())
    }

    pub fn evaluate(&self, x: u64) -> Scalar {
        let x = Scalar::from(x);
        self.0.iter().rev().fold(Scalar::ZERO, |acc, c| acc * x + c)
    }

    /// Public commitments `c_j * G` to every coefficient.
    pub fn commitments(&self) -> Vec<EdwardsPoint> {
        self.0.iter().map(EdwardsPoint::mul_base).collect()
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Evaluate the committed polynomial "in the exponent" at `x`.
pub fn evaluate_commitments(commitments: &[EdwardsPoint], x: u64) -> EdwardsPoint {
    let x = Scalar::from(x);
    commitments.iter().rev().fold(EdwardsPoint::identity(), |acc, c| acc * x + c)
}

/// Feldman check: `share * G == sum_j c_j * x^j`.
pub fn verify_share(share: &Scalar, commitments: &[EdwardsPoint], x: u64) -> bool {
    EdwardsPoint::mul_base(share) == evaluate_commitments(commitments, x)
}

/// Decode a prime-order Edwards point.
pub fn decode_point(bytes: &[u8; 32]) -> Option<EdwardsPoint> {
    let point = CompressedEdwardsY(*bytes).decompress()?;
    point.is_torsion_free().then_some(point)
}

pub fn decode_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_canonical_bytes(*bytes))
}

/// A share encrypted to one recipient's encryption public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    pub ephemeral: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Everything a ciphertext is bound to besides the key exchange.
#[derive(Debug, Clone, Copy)]
pub struct ShareContext {
    pub config_digest: ConfigDigest,
    pub key_id: KeyId,
    pub dealer: PlayerIdx,
    pub recipient: PlayerIdx,
}

impl ShareContext {
    fn associated_data(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(66);
        aad.extend_from_slice(&self.config_digest.0);
        aad.extend_from_slice(&self.key_id.0);
        aad.push(self.dealer.as_usize() as u8);
        aad.push(self.recipient.as_usize() as u8);
        aad
    }
}

fn share_cipher(
    shared_point: &[u8; 32],
    ephemeral: &[u8; 32],
    recipient_key: &[u8; 32],
    aad: &[u8],
) -> Aes256Gcm {
    let mut material = Zeroizing::new(Vec::with_capacity(96 + aad.len()));
    material.extend_from_slice(shared_point);
    material.extend_from_slice(ephemeral);
    material.extend_from_slice(recipient_key);
    material.extend_from_slice(aad);
    let key = Zeroizing::new(blake3::derive_key(SHARE_KDF_CONTEXT, &material));
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]))
}

/// Encrypt `share` to `recipient_key` with a fresh ephemeral key.
pub fn encrypt_share<R: CryptoRngCore + ?Sized>(
    group: &dyn EncryptionGroup,
    recipient_key: &[u8; 32],
    share: &Scalar,
    ctx: &ShareContext,
    rng: &mut R,
) -> Result<EncryptedShare, DkgError> {
    let ephemeral_secret = Zeroizing::new(Scalar::random(&mut *rng));
    let ephemeral = group.public_key(&ephemeral_secret);
    let shared = Zeroizing::new(
        group
            .diffie_hellman(&ephemeral_secret, recipient_key)
            .ok_or_else(|| DkgError::Crypto(format!("invalid encryption key for player {}", ctx.recipient)))?,
    );

    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);

    let aad = ctx.associated_data();
    let cipher = share_cipher(&shared, &ephemeral, recipient_key, &aad);
    let plaintext = Zeroizing::new(share.to_bytes());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: &plaintext[..], aad: &aad })
        .map_err(|e| DkgError::Crypto(format!("share encryption failed: {e:?}")))?;

    Ok(EncryptedShare { ephemeral, nonce, ciphertext })
}

/// Decrypt a share addressed to the holder of `secret`.
pub fn decrypt_share(
    group: &dyn EncryptionGroup,
    secret: &Scalar,
    encrypted: &EncryptedShare,
    ctx: &ShareContext,
) -> Result<Scalar, DkgError> {
    let shared = Zeroizing::new(
        group
            .diffie_hellman(secret, &encrypted.ephemeral)
            .ok_or_else(|| DkgError::Crypto("invalid ephemeral key".into()))?,
    );
    let own_key = group.public_key(secret);

    let aad = ctx.associated_data();
    let cipher = share_cipher(&shared, &encrypted.ephemeral, &own_key, &aad);
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&encrypted.nonce),
                Payload { msg: &encrypted.ciphertext, aad: &aad },
            )
            .map_err(|e| DkgError::Crypto(format!("share decryption failed: {e:?}")))?,
    );

    let bytes: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| DkgError::Crypto("decrypted share has wrong length".into()))?;
    decode_scalar(&bytes).ok_or_else(|| DkgError::Crypto("decrypted share is not a canonical scalar".into()))
}
