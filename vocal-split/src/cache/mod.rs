//! Content-addressable cache of separation results.
//!
//! Entries are keyed by a fingerprint of the raw source identifier and laid
//! out on disk as:
//!
//! ```text
//! <cache_dir>/<fingerprint>/vocals.<ext>
//! <cache_dir>/<fingerprint>/instrumental.<ext>
//! <cache_dir>/<fingerprint>/meta.json
//! ```

mod index;

use sha2::{Digest, Sha256};

pub use index::{CacheEntry, CacheIndex, CacheStats};

/// Number of hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 32;

/// Fingerprint of a source identifier: the first 16 bytes of its SHA-256
/// digest as lowercase hex.
///
/// Purely syntactic; two URLs naming the same video but differing in any
/// character (query order, tracking parameters) get different fingerprints.
pub fn fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}

/// Whether `s` has the shape of a fingerprint.
pub fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
