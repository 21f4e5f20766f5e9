//! Record identifiers
//!
//! Every durable record carries a stable id of the form
//! `<prefix>-<base36 timestamp>-<base36 random>` (spec section 3). Internally,
//! indexes (section 9 design notes) use a dense `u64` arena index and only
//! translate to/from this string at the store/index boundary, mirroring the
//! `key_to_id`/`id_to_key` pattern the teacher's vector index used for its
//! HNSW keys.

use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 alphabet is ASCII")
}

/// Generate a new id with the given record-type prefix (e.g. `"ep"`, `"fact"`,
/// `"causal"`).
pub fn new_id(prefix: &str) -> String {
    let timestamp = Utc::now().timestamp_millis().max(0) as u64;
    let random: u64 = rand::thread_rng().r#gen();
    format!("{prefix}-{}-{}", to_base36(timestamp), to_base36(random))
}

/// Extract the prefix portion of an id, if it matches the expected shape.
pub fn prefix_of(id: &str) -> Option<&str> {
    id.split('-').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_has_expected_shape() {
        let id = new_id("fact");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "fact");
        assert!(parts[1].chars().all(|c| BASE36.contains(&(c as u8))));
        assert!(parts[2].chars().all(|c| BASE36.contains(&(c as u8))));
    }

    #[test]
    fn new_id_is_unique_across_calls() {
        let a = new_id("ep");
        let b = new_id("ep");
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_of_extracts_leading_segment() {
        assert_eq!(prefix_of("fact-abc-def"), Some("fact"));
        assert_eq!(prefix_of("noseparator"), Some("noseparator"));
    }

    #[test]
    fn base36_roundtrip_zero() {
        assert_eq!(to_base36(0), "0");
    }
}
