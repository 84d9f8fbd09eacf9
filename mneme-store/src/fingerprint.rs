use sha2::{Digest, Sha256};

/// SHA-256 hex fingerprint of raw bytes. Depends only on content, never on
/// timestamps or paths, so the same bytes always produce the same value.
pub fn fingerprint_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub fn fingerprint_str(content: &str) -> String {
    fingerprint_bytes(content.as_bytes())
}

/// Combined digest over already-sorted per-document fingerprints. Used to
/// summarize the state of one whole corpus directory on a version entry.
pub fn combine_digests<'a>(digests: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for digest in digests {
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
