//! Request fingerprinting.
//!
//! A fingerprint is the SHA-256 digest of the ordered request tuple
//! `(url, format, quality, playlist, index)`, rendered as lowercase hex. It
//! is used as a durable cache key (status store key, artifact directory
//! name, notification group), so the encoding below must never change
//! without a migration of stored artifacts.

use sha2::{Digest, Sha256};

use crate::types::Fingerprint;

/// Domain tag mixed into every digest so fingerprints cannot collide with
/// other SHA-256 values the service might compute in the future.
const FINGERPRINT_DOMAIN: &[u8] = b"mediaflow.request.v1";

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the fingerprint of a request tuple.
///
/// String fields are hashed verbatim (no case folding or trimming). Each
/// field is length-prefixed, so shifting characters across a field boundary
/// always changes the digest. The playlist flag is already canonical
/// because it arrives as a `bool`.
pub fn fingerprint(
    url: &str,
    format: &str,
    quality: &str,
    is_playlist: bool,
    index: &str,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    for field in [url, format, quality, canonical_flag(is_playlist), index] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Canonical textual form of a boolean flag.
pub fn canonical_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Whether `s` has the shape of a fingerprint (64 lowercase hex chars).
///
/// Used to reject path-traversal attempts before a fingerprint is joined
/// onto the download directory.
pub fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identical_tuples_produce_identical_fingerprints() {
        let a = fingerprint("https://x/1", "mp3", "", false, "");
        let b = fingerprint("https://x/1", "mp3", "", false, "");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(is_valid_fingerprint(&a));
    }

    #[test]
    fn output_is_stable_across_releases() {
        // Pinned value: a change here invalidates every stored artifact.
        let fp = fingerprint("https://x/1", "mp3", "", false, "");
        assert_eq!(
            fp,
            "2dfc7ceff8e9e3eb856310eef9d5c3b85fcea9022b01e53631569a5eb378a69e"
        );
    }

    #[test]
    fn field_boundaries_are_significant() {
        let a = fingerprint("https://x/ab", "c", "", false, "");
        let b = fingerprint("https://x/a", "bc", "", false, "");
        assert_ne!(a, b);
    }

    #[test]
    fn url_is_case_sensitive() {
        let a = fingerprint("https://x/AbC", "mp3", "", false, "");
        let b = fingerprint("https://x/abc", "mp3", "", false, "");
        assert_ne!(a, b);
    }

    #[test]
    fn playlist_flag_changes_fingerprint() {
        let a = fingerprint("https://x/1", "mp3", "", false, "");
        let b = fingerprint("https://x/1", "mp3", "", true, "");
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_tuples_do_not_collide() {
        let formats = ["mp3", "mp4", "mkv", "webm"];
        let qualities = ["", "360", "480", "720", "1080"];
        let indexes = ["", "1", "2", "1,3", "2-5"];

        let mut seen = HashSet::new();
        let mut total = 0usize;
        for n in 0..200u32 {
            let url = format!("https://media.example/watch?v={:08x}", n.wrapping_mul(2_654_435_761));
            for format in formats {
                for quality in qualities {
                    for playlist in [false, true] {
                        for index in indexes {
                            total += 1;
                            assert!(
                                seen.insert(fingerprint(&url, format, quality, playlist, index)),
                                "collision for ({url}, {format}, {quality}, {playlist}, {index})"
                            );
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), total);
    }

    #[test]
    fn rejects_non_fingerprint_strings() {
        assert!(!is_valid_fingerprint(""));
        assert!(!is_valid_fingerprint("../etc/passwd"));
        assert!(!is_valid_fingerprint(&"A".repeat(64)));
        assert!(!is_valid_fingerprint(&"a".repeat(63)));
        assert!(is_valid_fingerprint(&"0".repeat(64)));
    }
}
