//! Canonical fingerprints of computed state.
//!
//! A pairing recomputation is reported with an xxh64 fingerprint of the
//! scores it persisted. Two runs over the same follow graph yield the same
//! fingerprint, which is how recomputation idempotence is checked.
//!
//! - Scores are sorted by `(user_a, user_b)` before hashing
//! - Degrees are hashed by bit pattern, never by formatted decimal

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::types::PairScore;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[derive(Serialize)]
struct ScoreRow<'a> {
    a: &'a str,
    b: &'a str,
    bits: u64,
}

/// Order-independent fingerprint of a set of pair scores.
pub fn scores_fingerprint(scores: &[PairScore]) -> String {
    let mut rows: Vec<ScoreRow<'_>> = scores
        .iter()
        .map(|s| ScoreRow {
            a: s.user_a.as_str(),
            b: s.user_b.as_str(),
            bits: s.degree.to_bits(),
        })
        .collect();
    rows.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));
    canonical_hash_hex(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn score(a: &str, b: &str, degree: f64) -> PairScore {
        PairScore {
            user_a: UserId::new(a),
            user_b: UserId::new(b),
            degree,
        }
    }

    #[test]
    fn test_fingerprint_ignores_input_order() {
        let forward = vec![score("a", "b", 0.75), score("b", "a", 0.75), score("a", "c", 0.0)];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(scores_fingerprint(&forward), scores_fingerprint(&reversed));
    }

    #[test]
    fn test_fingerprint_sees_degree_changes() {
        let before = vec![score("a", "b", 0.75)];
        let after = vec![score("a", "b", 0.5)];
        assert_ne!(scores_fingerprint(&before), scores_fingerprint(&after));
        assert_eq!(scores_fingerprint(&before).len(), 16);
    }
}
