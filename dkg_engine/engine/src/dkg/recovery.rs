//! Rebuilding this player's key share from persisted share records, for a
//! key that is already finalized on-chain.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::dkg::args::RoundContext;
use crate::dkg::dealing::{self, Dealing, OpenedDealing};
use crate::dkg::types::KeyData;
use crate::error::DkgError;
use crate::types::PlayerIdx;
use crate::vault::{SharePersistence, ShareRecord};

/// A dealing accepted into a round, kept with the record it was read from.
pub(crate) struct StoredDealing {
    pub record: ShareRecord,
    pub opened: OpenedDealing,
}

pub(crate) type DealingSet = BTreeMap<PlayerIdx, StoredDealing>;

/// Read, verify and combine the stored share records for this round's key.
/// `published_key` is the on-chain encoding the result must translate to.
pub(crate) async fn recover_key_data(
    ctx: &RoundContext,
    persistence: &dyn SharePersistence,
    published_key: &[u8],
) -> Result<(KeyData, DealingSet), DkgError> {
    let records = persistence
        .read_share_records(&ctx.config_digest, &ctx.key_id)
        .await
        .map_err(DkgError::PersistenceRead)?;
    if records.is_empty() {
        return Err(DkgError::NoShareRecords);
    }
    debug!(key_id = %ctx.key_id, records = records.len(), "read persisted share records");

    let mut dealings = DealingSet::new();
    for record in records {
        let dealer = record.dealer;
        if !record.hash_matches() {
            warn!(key_id = %ctx.key_id, dealer = %dealer, "persisted share record failed integrity check");
            return Err(DkgError::RecordHashMismatch { dealer });
        }
        if dealings.contains_key(&dealer) {
            return Err(DkgError::DuplicateDealing { dealer });
        }
        let dealing = Dealing::unmarshal(&record.marshaled_share_record)?;
        let opened = dealing::open(ctx, dealer, &dealing)?;
        dealings.insert(dealer, StoredDealing { record, opened });
    }

    let key_data = dealing::combine(ctx, dealings.values().map(|d| &d.opened))?;
    if key_data.onchain_public_key != published_key {
        return Err(DkgError::KeyMismatch);
    }
    Ok((key_data, dealings))
}
