//! Stable identifiers for pattern text.

use sha1::{Digest, Sha1};

/// Length of a pattern id in hex characters.
pub const PATTERN_ID_LEN: usize = 40;

/// SHA-1 over the UTF-8 bytes of `pattern`, lowercase hex.
///
/// Ids are written to the pattern store and must stay identical across
/// processes, platforms and other implementations reading the same file.
pub fn pattern_hash(pattern: &str) -> String {
    let digest = Sha1::digest(pattern.as_bytes());
    format!("{:x}", digest)
}

