// SecAPI Error Types

use std::error::Error;
use std::fmt;

/// Result code returned by every failing SecAPI operation.
///
/// Success is expressed as `Ok(..)`; this enum carries the remaining codes
/// of the secure processor contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecError {
    /// Generic failure
    Failure,

    /// Handle is missing or has already been finalized
    InvalidHandle,

    /// Malformed or out-of-contract arguments
    InvalidParameters,

    /// Input or output buffer size does not satisfy the operation
    InvalidInputSize,

    /// PKCS#7 padding of the final block is malformed
    InvalidPadding,

    /// Caller-supplied output buffer is too small
    BufferTooSmall,

    /// MAC or signature check failed
    VerificationFailed,

    /// No object with the requested id exists
    NoSuchItem,

    /// An object with the requested id already exists
    ItemAlreadyProvisioned,

    /// Object was found but resides in a non-removable location
    ItemNonRemovable,

    /// Requested container, algorithm, root, or location is not implemented
    UnimplementedFeature,
}

impl fmt::Display for SecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecError::Failure => write!(f, "operation failed"),
            SecError::InvalidHandle => write!(f, "invalid handle"),
            SecError::InvalidParameters => write!(f, "invalid parameters"),
            SecError::InvalidInputSize => write!(f, "invalid input size"),
            SecError::InvalidPadding => write!(f, "invalid padding"),
            SecError::BufferTooSmall => write!(f, "buffer too small"),
            SecError::VerificationFailed => write!(f, "verification failed"),
            SecError::NoSuchItem => write!(f, "no such item"),
            SecError::ItemAlreadyProvisioned => write!(f, "item already provisioned"),
            SecError::ItemNonRemovable => write!(f, "item non removable"),
            SecError::UnimplementedFeature => write!(f, "unimplemented feature"),
        }
    }
}

impl Error for SecError {}

/// Map primitive-layer errors into the public taxonomy.
impl From<crate::crypto::CryptoError> for SecError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        use crate::crypto::CryptoError;
        match err {
            CryptoError::VerificationFailed => SecError::VerificationFailed,
            CryptoError::InvalidKeySize(_) | CryptoError::InvalidInput(_) => {
                SecError::InvalidParameters
            }
            CryptoError::KeyParseFailed(_) => SecError::InvalidParameters,
            _ => SecError::Failure,
        }
    }
}

/// SecAPI Result Type
pub type SecResult<T> = Result<T, SecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SecError::VerificationFailed.to_string(),
            "verification failed"
        );
        assert_eq!(SecError::NoSuchItem.to_string(), "no such item");
    }

    #[test]
    fn test_crypto_error_mapping() {
        let err: SecError = crate::crypto::CryptoError::VerificationFailed.into();
        assert_eq!(err, SecError::VerificationFailed);

        let err: SecError =
            crate::crypto::CryptoError::InvalidKeySize("16 != 32".to_string()).into();
        assert_eq!(err, SecError::InvalidParameters);

        let err: SecError =
            crate::crypto::CryptoError::EncryptionFailed("boom".to_string()).into();
        assert_eq!(err, SecError::Failure);
    }
}
