//! Feldman VSS dealings: what each player contributes to the shared key.
//!
//! A dealing carries commitments to a random degree-`t` polynomial and one
//! encrypted evaluation per player. It is signed by the dealer over a
//! domain-separated encoding that binds the config digest and key id. The
//! marshaled dealing is exactly what gets persisted as a share record.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::sharing::{
    EncryptedShare, Polynomial, ShareContext, decode_point, decrypt_share, encrypt_share,
    evaluate_commitments, verify_share,
};
use crate::crypto::signing::{parse_verifying_key, sign_message, verify_signature};
use crate::dkg::args::RoundContext;
use crate::dkg::types::{KeyData, SecretShare};
use crate::error::DkgError;
use crate::types::{ConfigDigest, KeyId, PlayerIdx};

const DEALING_DOMAIN: &str = "dkg-engine/dealing/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dealing {
    pub dealer: PlayerIdx,
    pub config_digest: ConfigDigest,
    pub key_id: KeyId,
    pub commitments: Vec<[u8; 32]>,
    pub shares: Vec<EncryptedShare>,
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct SignedPayload<'a> {
    domain: &'static str,
    dealer: PlayerIdx,
    config_digest: &'a ConfigDigest,
    key_id: &'a KeyId,
    commitments: &'a [[u8; 32]],
    shares: &'a [EncryptedShare],
}

impl Dealing {
    fn signed_payload(&self) -> Result<Vec<u8>, DkgError> {
        let payload = SignedPayload {
            domain: DEALING_DOMAIN,
            dealer: self.dealer,
            config_digest: &self.config_digest,
            key_id: &self.key_id,
            commitments: &self.commitments,
            shares: &self.shares,
        };
        Ok(bincode::serialize(&payload)?)
    }

    pub fn marshal(&self) -> Result<Vec<u8>, DkgError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, DkgError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// A dealing that passed every check, reduced to what key combination needs.
pub struct OpenedDealing {
    pub dealer: PlayerIdx,
    pub commitments: Vec<EdwardsPoint>,
    pub share: Zeroizing<Scalar>,
}

/// Produce this player's signed dealing.
pub fn deal<R: CryptoRngCore + ?Sized>(ctx: &RoundContext, rng: &mut R) -> Result<Dealing, DkgError> {
    let polynomial = Polynomial::random(ctx.threshold, &mut *rng);
    let commitments = polynomial.commitments().iter().map(|c| c.compress().to_bytes()).collect();

    let mut shares = Vec::with_capacity(ctx.players);
    for recipient in PlayerIdx::all(ctx.players)? {
        let share = Zeroizing::new(polynomial.evaluate(recipient.eval_point()));
        let share_ctx = ShareContext {
            config_digest: ctx.config_digest,
            key_id: ctx.key_id,
            dealer: ctx.self_idx,
            recipient,
        };
        let key = &ctx.encryption_public_keys[recipient.as_usize()];
        shares.push(encrypt_share(ctx.encryption_group, key, &share, &share_ctx, &mut *rng)?);
    }

    let mut dealing = Dealing {
        dealer: ctx.self_idx,
        config_digest: ctx.config_digest,
        key_id: ctx.key_id,
        commitments,
        shares,
        signature: Vec::new(),
    };
    dealing.signature = sign_message(&ctx.keys.signing_key, &dealing.signed_payload()?);
    Ok(dealing)
}

/// Check a dealing claimed to come from `dealer` and decrypt our share of it.
pub fn open(ctx: &RoundContext, dealer: PlayerIdx, dealing: &Dealing) -> Result<OpenedDealing, DkgError> {
    let invalid = |reason: &str| DkgError::InvalidDealing { dealer, reason: reason.to_string() };

    if dealing.dealer != dealer {
        return Err(invalid("dealer index does not match sender"));
    }
    if dealer.as_usize() >= ctx.players {
        return Err(invalid("dealer is not a player in this round"));
    }
    if dealing.config_digest != ctx.config_digest {
        return Err(invalid("config digest mismatch"));
    }
    if dealing.key_id != ctx.key_id {
        return Err(invalid("key id mismatch"));
    }
    if dealing.commitments.len() != ctx.threshold + 1 {
        return Err(invalid("wrong number of commitments"));
    }
    if dealing.shares.len() != ctx.players {
        return Err(invalid("wrong number of shares"));
    }

    let verifying_key = parse_verifying_key(&ctx.signing_public_keys[dealer.as_usize()])
        .map_err(|e| invalid(&e))?;
    verify_signature(&verifying_key, &dealing.signed_payload()?, &dealing.signature)
        .map_err(|e| invalid(&e))?;

    let commitments = dealing
        .commitments
        .iter()
        .map(decode_point)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid("commitment is not a prime-order point"))?;

    let share_ctx = ShareContext {
        config_digest: ctx.config_digest,
        key_id: ctx.key_id,
        dealer,
        recipient: ctx.self_idx,
    };
    let share = Zeroizing::new(
        decrypt_share(
            ctx.encryption_group,
            &ctx.keys.encryption_secret,
            &dealing.shares[ctx.self_idx.as_usize()],
            &share_ctx,
        )
        .map_err(|e| invalid(&e.to_string()))?,
    );
    if !verify_share(&share, &commitments, ctx.self_idx.eval_point()) {
        return Err(invalid("share does not match commitments"));
    }

    Ok(OpenedDealing { dealer, commitments, share })
}

/// Sum verified dealings into this player's key material.
pub fn combine<'a>(
    ctx: &RoundContext,
    opened: impl IntoIterator<Item = &'a OpenedDealing>,
) -> Result<KeyData, DkgError> {
    let mut secret = Zeroizing::new(Scalar::ZERO);
    let mut aggregate = vec![EdwardsPoint::identity(); ctx.threshold + 1];
    let mut dealers = Vec::new();

    for dealing in opened {
        *secret += *dealing.share;
        for (acc, c) in aggregate.iter_mut().zip(&dealing.commitments) {
            *acc += c;
        }
        dealers.push(dealing.dealer);
    }

    let need = ctx.threshold + 1;
    if dealers.len() < need {
        return Err(DkgError::InsufficientDealings { have: dealers.len(), need });
    }
    dealers.sort();

    let public_shares = PlayerIdx::all(ctx.players)?
        .into_iter()
        .map(|p| evaluate_commitments(&aggregate, p.eval_point()).compress().to_bytes())
        .collect::<Vec<_>>();
    if EdwardsPoint::mul_base(&secret).compress().to_bytes() != public_shares[ctx.self_idx.as_usize()] {
        return Err(DkgError::Crypto("combined share does not match combined commitments".into()));
    }

    let public_key = aggregate[0];
    Ok(KeyData {
        key_id: ctx.key_id,
        public_key: public_key.compress().to_bytes(),
        onchain_public_key: ctx.translator.translate(&public_key),
        public_shares,
        secret_share: SecretShare(secret),
        threshold: ctx.threshold,
        dealers,
    })
}
