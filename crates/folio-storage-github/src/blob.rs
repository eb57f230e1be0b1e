//! Git blob hashing.

use sha1::{Digest, Sha1};

/// Compute the git blob SHA of `content`: `sha1("blob {len}\0" + content)`.
///
/// Matches the SHA the remote assigns to the same bytes, so batch writes can
/// refresh the hash cache without reading the file back.
pub fn git_blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blob() {
        assert_eq!(git_blob_sha(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_hello_blob() {
        assert_eq!(
            git_blob_sha(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }
}
