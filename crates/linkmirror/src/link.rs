//! Link hashing used for indexed lookups.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 of a link.
///
/// Links are hashed verbatim. An empty link hashes to the empty string so
/// rows without a hosted mirror yet do not all share one digest.
pub fn hash(link: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    format!("{:x}", Sha256::digest(link.as_bytes()))
}
