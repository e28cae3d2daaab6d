use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of a serialized object (64 characters).
///
/// Only used to tell whether the bytes changed across a transform.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_fixed_length() {
        let a = digest(b"dicom");
        assert_eq!(a, digest(b"dicom"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, digest(b"dicon"));
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
