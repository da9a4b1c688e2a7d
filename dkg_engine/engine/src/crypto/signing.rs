//! Dealer signatures over dealings, keyed by the players' Ed25519 signing keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Parse an Ed25519 verifying key.
pub fn parse_verifying_key(bytes: &[u8; 32]) -> Result<VerifyingKey, String> {
    VerifyingKey::from_bytes(bytes).map_err(|e| format!("Invalid public key: {:?}", e))
}

pub fn sign_message(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verify a signature against a message and public key.
pub fn verify_signature(
    pubkey: &VerifyingKey,
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), String> {
    let signature = Signature::from_slice(signature_bytes)
        .map_err(|e| format!("Invalid signature format: {:?}", e))?;

    pubkey
        .verify(message, &signature)
        .map_err(|e| format!("Signature verification failed: {:?}", e))
}
