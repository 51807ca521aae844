use crate::payload::{payload_type, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Difficulty used by every production chain: leading `'0'` hex characters.
pub const DIFFICULTY: usize = 4;

/// `prev_hash` of a genesis block that has no parent chain.
pub const ROOT_SENTINEL: &str = "0";

/// A sealed block as persisted. Field names are the wire format; `hash` and
/// `nonce` are stored verbatim and never recomputed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Value,
    pub prev_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// An unsealed block stamped with the current time. `hash` stays empty
    /// until the block goes through the miner.
    pub fn new(index: u64, prev_hash: impl Into<String>, transactions: Value) -> Self {
        Block {
            index,
            timestamp: chrono::Utc::now().timestamp_millis(),
            transactions,
            prev_hash: prev_hash.into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Digest of the stored fields, independent of the stored `hash`.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = preimage_hasher(self.timestamp, &self.transactions, &self.prev_hash);
        hasher.update(nonce_suffix(self.nonce));
        hex::encode(hasher.finalize())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn payload_type(&self) -> Option<&str> {
        payload_type(&self.transactions)
    }

    pub fn payload(&self) -> Option<Payload> {
        Payload::from_value(&self.transactions)
    }
}

/// True when `hash` starts with at least `difficulty` `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Canonical byte encoding of the hashed block fields.
///
/// Layout is a compact JSON object with the fixed field order
/// `timestamp`, `transactions`, `prev_hash`, `nonce`. Object keys inside the
/// payload are written in sorted order at every depth, so two payloads that
/// compare equal always encode to the same bytes regardless of how their maps
/// were built or which serde_json features are enabled.
pub fn canonical_encode(timestamp: i64, transactions: &Value, prev_hash: &str, nonce: u64) -> Vec<u8> {
    let mut out = canonical_prefix(timestamp, transactions, prev_hash);
    out.extend_from_slice(&nonce_suffix(nonce));
    out
}

/// Hasher already fed with everything that precedes the nonce. The miner
/// clones it once per attempt instead of re-encoding the payload.
pub(crate) fn preimage_hasher(timestamp: i64, transactions: &Value, prev_hash: &str) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(canonical_prefix(timestamp, transactions, prev_hash));
    hasher
}

pub(crate) fn nonce_suffix(nonce: u64) -> Vec<u8> {
    format!("{}}}", nonce).into_bytes()
}

fn canonical_prefix(timestamp: i64, transactions: &Value, prev_hash: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(b"{\"timestamp\":");
    out.extend_from_slice(timestamp.to_string().as_bytes());
    out.extend_from_slice(b",\"transactions\":");
    write_canonical(transactions, &mut out);
    out.extend_from_slice(b",\"prev_hash\":");
    write_string(prev_hash, &mut out);
    out.extend_from_slice(b",\"nonce\":");
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_canonical(item, out);
            }
            out.push(b'}');
        }
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's string escaping is fixed (short escapes plus \u00XX for
    // other control characters), which is all the stability needed here.
    match serde_json::to_vec(s) {
        Ok(bytes) => out.extend_from_slice(&bytes),
        Err(_) => out.extend_from_slice(b"\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoding_has_fixed_field_order() {
        let bytes = canonical_encode(17, &json!({"x": 1}), "0", 42);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"timestamp":17,"transactions":{"x":1},"prev_hash":"0","nonce":42}"#
        );
    }

    #[test]
    fn payload_keys_are_sorted_at_every_depth() {
        let a = json!({"b": {"z": 1, "a": [true, null]}, "a": "s"});
        let bytes = canonical_encode(0, &a, "0", 0);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"timestamp":0,"transactions":{"a":"s","b":{"a":[true,null],"z":1}},"prev_hash":"0","nonce":0}"#
        );
    }

    #[test]
    fn strings_are_json_escaped() {
        let bytes = canonical_encode(0, &json!("a\"b\n"), "0", 0);
        assert!(String::from_utf8(bytes).unwrap().contains(r#""a\"b\n""#));
    }

    #[test]
    fn calculate_hash_is_sha256_of_canonical_encoding() {
        let block = Block {
            index: 3,
            timestamp: 1_700_000_000_000,
            transactions: json!({"type": "genesis", "name": "Alpha"}),
            prev_hash: ROOT_SENTINEL.to_string(),
            nonce: 9,
            hash: String::new(),
        };
        let expected = hex::encode(Sha256::digest(canonical_encode(
            block.timestamp,
            &block.transactions,
            &block.prev_hash,
            block.nonce,
        )));
        assert_eq!(block.calculate_hash(), expected);
        assert_eq!(expected.len(), 64);
        assert!(expected.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn index_is_not_part_of_the_digest() {
        let mut block = Block::new(1, "abc", json!({"x": 1}));
        let before = block.calculate_hash();
        block.index = 7;
        assert_eq!(block.calculate_hash(), before);
    }

    #[test]
    fn difficulty_prefix_check() {
        assert!(meets_difficulty("0000ab", 4));
        assert!(!meets_difficulty("000ab0", 4));
        assert!(meets_difficulty("f", 0));
        assert!(!meets_difficulty("00", 3));
    }
}
