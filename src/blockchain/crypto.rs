use sha2::{Digest, Sha256};

use super::block::Payload;

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Length of a hex encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Highest meaningful difficulty (every hex character must be zero)
pub const MAX_DIFFICULTY: u8 = DIGEST_HEX_LEN as u8;

/// Computes the SHA-256 digest of a block's content
///
/// The content is serialized as a compact JSON object with sorted keys:
/// `{"data", "index", "nonce", "previous_hash", "timestamp"}`.
///
/// # Returns
///
/// The digest as a lowercase hexadecimal string
pub fn digest(
    index: u64,
    timestamp: i64,
    previous_hash: &str,
    payload: &Payload,
    nonce: u64,
) -> String {
    let block_data = serde_json::json!({
        "index": index,
        "timestamp": timestamp,
        "previous_hash": previous_hash,
        "data": payload.canonical(),
        "nonce": nonce,
    });

    let mut hasher = Sha256::new();
    hasher.update(block_data.to_string().as_bytes());

    hex::encode(hasher.finalize())
}

/// Checks whether a hex digest starts with at least `difficulty` zero characters
pub fn meets_difficulty(hash: &str, difficulty: u8) -> bool {
    let difficulty = difficulty as usize;

    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(voter_id: &str, candidate: &str) -> Payload {
        Payload::Vote {
            voter_id: voter_id.to_string(),
            candidate: candidate.to_string(),
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest(1, 1_700_000_000, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 42);
        let b = digest(1, 1_700_000_000, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 42);

        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_HEX_LEN);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_changes_with_every_field() {
        let base = digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 0);

        assert_ne!(base, digest(2, 100, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 0));
        assert_ne!(base, digest(1, 101, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 0));
        assert_ne!(base, digest(1, 100, "ff", &vote("V1", "Alice"), 0));
        assert_ne!(base, digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V2", "Alice"), 0));
        assert_ne!(base, digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V1", "Bob"), 0));
        assert_ne!(base, digest(1, 100, GENESIS_PREVIOUS_HASH, &Payload::Genesis, 0));
        assert_ne!(base, digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 1));
    }

    #[test]
    fn test_payload_encoding_is_unambiguous() {
        // Field boundaries must not be shiftable between voter and candidate
        let a = digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V1A", "lice"), 0);
        let b = digest(1, 100, GENESIS_PREVIOUS_HASH, &vote("V1", "Alice"), 0);

        assert_ne!(a, b);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 0));
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(!meets_difficulty("00", 3));
        assert!(meets_difficulty(GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY));
    }
}
