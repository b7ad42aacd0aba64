use sha2::{Digest, Sha256};
use std::path::Path;

/// Length of a digest produced by [`hash_name`]
pub const DIGEST_LEN: usize = 64;

/// Hash an original filename into a lowercase hex SHA-256 digest.
///
/// Only the UTF-8 bytes of the name are hashed, never the file content, so the
/// same name always yields the same digest.
pub fn hash_name(original_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_name.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the anonymized filename: digest of the full name plus the original extension
pub fn hashed_file_name(original_name: &str) -> String {
    format!("{}{}", hash_name(original_name), dotted_extension(original_name))
}

/// Extension of `name` including its leading dot, case preserved, empty if none
pub fn dotted_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_name_known_value() {
        assert_eq!(
            hash_name("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_name_is_deterministic_and_distinct() {
        let first = hash_name("photo.png");
        assert_eq!(first, hash_name("photo.png"));
        assert_ne!(first, hash_name("photo.jpg"));
        assert_ne!(hash_name("a"), hash_name("b"));
        assert_eq!(first.len(), DIGEST_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_name_non_ascii() {
        // NFC and NFD spellings are different byte sequences
        assert_ne!(hash_name("caf\u{e9}.jpg"), hash_name("cafe\u{301}.jpg"));
        assert_eq!(hash_name("zdj\u{119}cie.png").len(), DIGEST_LEN);
    }

    #[test]
    fn test_hashed_file_name_keeps_extension() {
        assert_eq!(hashed_file_name("a.png"), format!("{}.png", hash_name("a.png")));
        assert_eq!(hashed_file_name("B.JPG"), format!("{}.JPG", hash_name("B.JPG")));
        assert_eq!(hashed_file_name("archive.tar.gz"), format!("{}.gz", hash_name("archive.tar.gz")));
        assert_eq!(hashed_file_name("README"), hash_name("README"));
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension("x.jpeg"), ".jpeg");
        assert_eq!(dotted_extension("noext"), "");
        assert_eq!(dotted_extension(".hidden"), "");
    }
}
