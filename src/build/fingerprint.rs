//! Content fingerprinting for cache-busting.
//!
//! The hash is a pure function of the file contents: identical bytes always
//! produce the same fingerprinted name and any change produces a new one.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Number of hex digits kept from the content hash.
pub const HASH_LEN: usize = 10;

/// Hex digest prefix of the SHA-256 of `contents`.
pub fn content_hash(contents: &[u8]) -> String {
    let mut hex = format!("{:x}", Sha256::digest(contents));
    hex.truncate(HASH_LEN);
    hex
}

/// Insert `-<hash>` before the final extension of the file name.
///
/// `css/site.css` becomes `css/site-<hash>.css`; `LICENSE` becomes
/// `LICENSE-<hash>`.
pub fn fingerprint_path(path: &str, hash: &str) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };

    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}{}-{}{}", dir, &name[..idx], hash, &name[idx..]),
        _ => format!("{}{}-{}", dir, name, hash),
    }
}

/// Fingerprint a path from the contents it will hold.
pub fn fingerprint(path: &str, contents: &[u8]) -> String {
    fingerprint_path(path, &content_hash(contents))
}

/// Whether a path already carries a fingerprint suffix.
pub fn is_fingerprinted(path: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(&format!(r"-[0-9a-f]{{{}}}(\.[^/.]+)?$", HASH_LEN)).expect("valid regex")
    });
    re.is_match(path)
}
