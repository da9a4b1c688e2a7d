
use std::path::Path;

use crate::types::{ConfigDigest, KeyId};

const PREFIX: &str = "shares";
const EXTENSION: &str = ".sealed";

/// Metadata extracted from a validated share-set filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareFileMetadata {
    pub config_digest: ConfigDigest,
    pub key_id: KeyId,
    pub filename: String,
}

/// Filename a sealed share set for `(config_digest, key_id)` is stored under.
pub fn share_file_name(config_digest: &ConfigDigest, key_id: &KeyId) -> String {
    format!(
        "{PREFIX}_{}_{}{EXTENSION}",
        hex::encode(config_digest.0),
        hex::encode(key_id.0)
    )
}

/// Validates the filename structure and extracts the digest / key ID pair.
///
/// Enforces:
/// - Format: shares_<digest hex>_<key id hex>.sealed
/// - both hex parts decode to exactly 32 bytes
pub fn validate_share_filename(path: &str) -> Result<ShareFileMetadata, String> {
    let path = Path::new(path);
    let filename = path
        .file_name()
        .ok_or("Missing share filename")?
        .to_str()
        .ok_or("Invalid share filename encoding")?;

    let stem = filename
        .strip_suffix(EXTENSION)
        .ok_or("Share file must end with '.sealed'")?;

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 3 || parts[0] != PREFIX {
        return Err("Share filename must look like 'shares_<digest>_<key id>'".into());
    }

    Ok(ShareFileMetadata {
        config_digest: ConfigDigest(decode_id(parts[1])?),
        key_id: KeyId(decode_id(parts[2])?),
        filename: filename.to_string(),
    })
}

fn decode_id(part: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(part).map_err(|e| format!("Invalid hex in share filename: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| "Share filename IDs must be 32 bytes".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trips() {
        let digest = ConfigDigest([0x11; 32]);
        let key_id = KeyId([0x22; 32]);
        let name = share_file_name(&digest, &key_id);
        assert!(name.starts_with("shares_1111"));

        let meta = validate_share_filename(&format!("/var/lib/dkg/{name}")).unwrap();
        assert_eq!(meta.config_digest, digest);
        assert_eq!(meta.key_id, key_id);
        assert_eq!(meta.filename, name);
    }

    #[test]
    fn test_rejects_foreign_files() {
        assert!(validate_share_filename("shard_1.bin").is_err());
        assert!(validate_share_filename("shares_abcd_ef.sealed").is_err());
        assert!(validate_share_filename(&"shares_".repeat(3)).is_err());
        let tmp = format!("{}.tmp", share_file_name(&ConfigDigest([0; 32]), &KeyId([0; 32])));
        assert!(validate_share_filename(&tmp).is_err());
    }
}
