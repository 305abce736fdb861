// SecAPI Digest Primitives
// SHA-1 and SHA-256 streaming contexts over the RustCrypto hash crates.

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::types::DigestAlgorithm;

/// Streaming digest context.
pub enum DigestCtx {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl DigestCtx {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha1 => DigestCtx::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => DigestCtx::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, input: &[u8]) {
        match self {
            DigestCtx::Sha1(ctx) => ctx.update(input),
            DigestCtx::Sha256(ctx) => ctx.update(input),
        }
    }

    /// Finalize and return the digest (20 or 32 bytes).
    pub fn finish(self) -> Vec<u8> {
        match self {
            DigestCtx::Sha1(ctx) => ctx.finalize().to_vec(),
            DigestCtx::Sha256(ctx) => ctx.finalize().to_vec(),
        }
    }
}

/// One-shot digest.
pub fn digest(algorithm: DigestAlgorithm, input: &[u8]) -> Vec<u8> {
    let mut ctx = DigestCtx::new(algorithm);
    ctx.update(input);
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        // FIPS 180-4 vector for the empty string
        let out = digest(DigestAlgorithm::Sha256, b"");
        assert_eq!(
            hex::encode(out),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha1_abc() {
        let out = digest(DigestAlgorithm::Sha1, b"abc");
        assert_eq!(hex::encode(out), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut ctx = DigestCtx::new(DigestAlgorithm::Sha256);
        ctx.update(b"hello ");
        ctx.update(b"world");
        assert_eq!(ctx.finish(), digest(DigestAlgorithm::Sha256, b"hello world"));
    }
}
