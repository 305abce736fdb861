// SecAPI Cryptographic Primitive Layer
//
// Thin adapters over the RustCrypto crates. Nothing in here knows about
// object ids, containers, or the secure store; errors are mapped into the
// public taxonomy at the layer boundary.

pub mod aes;
pub mod digest;
pub mod mac;
pub mod random;
pub mod rsa;

use std::error::Error;
use std::fmt;

/// Primitive-layer error types.
#[derive(Debug, Clone)]
pub enum CryptoError {
    KeyGenerationFailed(String),
    EncryptionFailed(String),
    DecryptionFailed(String),
    SignatureFailed(String),
    VerificationFailed,
    InvalidKeySize(String),
    InvalidInput(String),
    KeyParseFailed(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyGenerationFailed(msg) => write!(f, "key generation failed: {}", msg),
            CryptoError::EncryptionFailed(msg) => write!(f, "encryption failed: {}", msg),
            CryptoError::DecryptionFailed(msg) => write!(f, "decryption failed: {}", msg),
            CryptoError::SignatureFailed(msg) => write!(f, "signature generation failed: {}", msg),
            CryptoError::VerificationFailed => write!(f, "signature verification failed"),
            CryptoError::InvalidKeySize(msg) => write!(f, "invalid key size: {}", msg),
            CryptoError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CryptoError::KeyParseFailed(msg) => write!(f, "key parse failed: {}", msg),
        }
    }
}

impl Error for CryptoError {}

pub type CryptoResult<T> = Result<T, CryptoError>;
