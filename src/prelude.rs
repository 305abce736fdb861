// SecAPI Prelude Module
// Convenient re-exports for common usage

pub use crate::bundle::BundleHandle;
pub use crate::cert::CertificateHandle;
pub use crate::cipher::CipherHandle;
pub use crate::digest::DigestHandle;
pub use crate::error::{SecError, SecResult};
pub use crate::key::KeyHandle;
pub use crate::mac::MacHandle;
pub use crate::processor::{CustomKeyContainer, ProcessorInitParams, SecProcessor};
pub use crate::random::RandomHandle;
pub use crate::signature::SignatureHandle;
pub use crate::types::{
    object_id, CertificateContainer, CipherAlgorithm, CipherMode, DigestAlgorithm, KeyContainer,
    KeyLadderRoot, KeyType, MacAlgorithm, ObjectId, RandomAlgorithm, SignatureAlgorithm,
    SignatureMode, StorageLoc,
};

// Contract constants
pub use crate::{API_VERSION, VERSION};
