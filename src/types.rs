//! Core SecAPI types: object ids, key/container/algorithm enums and limits.
//!
//! Everything here is data-only; behavior lives with the handles.

use serde::{Deserialize, Serialize};

/// 64-bit identifier naming a key, certificate, or bundle within a processor.
pub type ObjectId = u64;

/// Reserved object ids for system objects.
pub mod object_id {
    use super::ObjectId;

    /// AES key protecting secure-store payloads
    pub const STORE_AES_KEY: ObjectId = 0x0000_0000_0000_0001;
    /// Key generating secure-store MACs (CMAC-AES-128)
    pub const STORE_MACKEYGEN_KEY: ObjectId = 0x0000_0000_0000_0002;
    /// Certificate-store MAC key (HMAC-SHA-256)
    pub const CERTSTORE_KEY: ObjectId = 0x0000_0000_0000_0003;
    /// Base key materialized by the ladder, AES flavor
    pub const BASE_KEY_AES: ObjectId = 0x0000_0000_0000_0004;
    /// Base key materialized by the ladder, MAC flavor
    pub const BASE_KEY_MAC: ObjectId = 0x0000_0000_0000_0005;
    /// Scratch slot used while a derivation is in flight
    pub const DERIVE_TMP: ObjectId = 0x0000_0000_0000_0010;
    /// Never a valid object id
    pub const INVALID: ObjectId = 0xFFFF_FFFF_FFFF_FFFF;
}

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;
/// Largest symmetric key the processor handles.
pub const SYMMETRIC_KEY_MAX_LEN: usize = 32;
/// Largest MAC value (HMAC-SHA-256).
pub const MAC_MAX_LEN: usize = 32;
/// Largest digest value (SHA-256).
pub const DIGEST_MAX_LEN: usize = 32;
/// Upper bound on a wrapped key container.
pub const KEYCONTAINER_MAX_LEN: usize = 2560;
/// Upper bound on a stored certificate (DER).
pub const CERTIFICATE_MAX_LEN: usize = 4096;
/// Upper bound on an opaque bundle.
pub const BUNDLE_MAX_LEN: usize = 4096;
/// Device id length.
pub const DEVICE_ID_LEN: usize = 8;
/// Upper bound on a storage directory path.
pub const MAX_FILE_PATH_LEN: usize = 4096;

/// Key type of a provisioned object. Implies length and symmetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Aes128,
    Aes256,
    Hmac128,
    Hmac160,
    Hmac256,
    Rsa1024,
    Rsa2048,
    Rsa1024Public,
    Rsa2048Public,
}

impl KeyType {
    /// Key length in bytes. For RSA this is the modulus size.
    pub fn key_len(&self) -> usize {
        match self {
            KeyType::Aes128 | KeyType::Hmac128 => 16,
            KeyType::Hmac160 => 20,
            KeyType::Aes256 | KeyType::Hmac256 => 32,
            KeyType::Rsa1024 | KeyType::Rsa1024Public => 128,
            KeyType::Rsa2048 | KeyType::Rsa2048Public => 256,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            KeyType::Aes128
                | KeyType::Aes256
                | KeyType::Hmac128
                | KeyType::Hmac160
                | KeyType::Hmac256
        )
    }

    pub fn is_aes(&self) -> bool {
        matches!(self, KeyType::Aes128 | KeyType::Aes256)
    }

    pub fn is_hmac(&self) -> bool {
        matches!(self, KeyType::Hmac128 | KeyType::Hmac160 | KeyType::Hmac256)
    }

    pub fn is_rsa(&self) -> bool {
        !self.is_symmetric()
    }

    /// True for key types carrying private material.
    pub fn is_private(&self) -> bool {
        matches!(self, KeyType::Rsa1024 | KeyType::Rsa2048)
    }

    /// The raw (clear) container that carries this key type on the wire.
    pub fn clear_container(&self) -> KeyContainer {
        match self {
            KeyType::Aes128 => KeyContainer::RawAes128,
            KeyType::Aes256 => KeyContainer::RawAes256,
            KeyType::Hmac128 => KeyContainer::RawHmac128,
            KeyType::Hmac160 => KeyContainer::RawHmac160,
            KeyType::Hmac256 => KeyContainer::RawHmac256,
            KeyType::Rsa1024 => KeyContainer::RawRsa1024,
            KeyType::Rsa2048 => KeyContainer::RawRsa2048,
            KeyType::Rsa1024Public => KeyContainer::RawRsa1024Public,
            KeyType::Rsa2048Public => KeyContainer::RawRsa2048Public,
        }
    }
}

/// Wire format of an incoming key blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyContainer {
    RawAes128,
    RawAes256,
    RawHmac128,
    RawHmac160,
    RawHmac256,
    RawRsa1024,
    RawRsa2048,
    RawRsa1024Public,
    RawRsa2048Public,
    /// DER private key, PKCS#8 or PKCS#1
    DerRsa1024,
    DerRsa2048,
    /// DER public key, SubjectPublicKeyInfo or bare RSAPublicKey
    DerRsa1024Public,
    DerRsa2048Public,
    PemRsa1024,
    PemRsa2048,
    PemRsa1024Public,
    PemRsa2048Public,
    /// Two 16-byte key ladder inputs
    Derived,
    /// Already-wrapped secure store blob
    Store,
    /// Vendor extension container, dispatched to the registered handler
    Extension(u32),
}

impl KeyContainer {
    /// Stable numeric tag recorded in store headers.
    pub(crate) fn wire_id(&self) -> u32 {
        match self {
            KeyContainer::RawAes128 => 0,
            KeyContainer::RawAes256 => 1,
            KeyContainer::RawHmac128 => 2,
            KeyContainer::RawHmac160 => 3,
            KeyContainer::RawHmac256 => 4,
            KeyContainer::RawRsa1024 => 5,
            KeyContainer::RawRsa2048 => 6,
            KeyContainer::RawRsa1024Public => 7,
            KeyContainer::RawRsa2048Public => 8,
            KeyContainer::DerRsa1024 => 9,
            KeyContainer::DerRsa2048 => 10,
            KeyContainer::DerRsa1024Public => 11,
            KeyContainer::DerRsa2048Public => 12,
            KeyContainer::PemRsa1024 => 13,
            KeyContainer::PemRsa2048 => 14,
            KeyContainer::PemRsa1024Public => 15,
            KeyContainer::PemRsa2048Public => 16,
            KeyContainer::Derived => 17,
            KeyContainer::Store => 18,
            KeyContainer::Extension(id) => 0x1000 + id,
        }
    }
}

/// Wire format of an incoming certificate blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateContainer {
    X509Der,
    X509Pem,
}

/// Where an object lives once provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLoc {
    Ram,
    RamSoftWrapped,
    File,
    FileSoftWrapped,
    Oem,
}

impl StorageLoc {
    pub(crate) fn is_ram(&self) -> bool {
        matches!(self, StorageLoc::Ram | StorageLoc::RamSoftWrapped)
    }

    pub(crate) fn is_file(&self) -> bool {
        matches!(self, StorageLoc::File | StorageLoc::FileSoftWrapped)
    }
}

/// Cipher algorithms exposed through cipher handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    AesEcbNoPadding,
    AesEcbPkcs7,
    AesCbcNoPadding,
    AesCbcPkcs7,
    AesCtr,
    RsaPkcs1,
    RsaOaep,
}

impl CipherAlgorithm {
    pub(crate) fn is_aes(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::AesEcbNoPadding
                | CipherAlgorithm::AesEcbPkcs7
                | CipherAlgorithm::AesCbcNoPadding
                | CipherAlgorithm::AesCbcPkcs7
                | CipherAlgorithm::AesCtr
        )
    }

}

/// Direction of a cipher session. The NATIVEMEM flavors are allocator hints
/// for callers and behave identically to the plain modes here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
    EncryptNativeMem,
    DecryptNativeMem,
}

impl CipherMode {
    pub(crate) fn is_encrypt(&self) -> bool {
        matches!(self, CipherMode::Encrypt | CipherMode::EncryptNativeMem)
    }
}

/// Digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn digest_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
        }
    }
}

/// MAC algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
    CmacAes128,
}

impl MacAlgorithm {
    /// Length of the produced MAC in bytes.
    pub fn mac_len(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::CmacAes128 => 16,
        }
    }

    /// Key type a MAC of this algorithm produces when re-provisioned as a key.
    pub(crate) fn output_key_type(&self) -> KeyType {
        match self {
            MacAlgorithm::HmacSha1 => KeyType::Hmac160,
            MacAlgorithm::HmacSha256 => KeyType::Hmac256,
            MacAlgorithm::CmacAes128 => KeyType::Aes128,
        }
    }
}

/// Signature algorithms. The `Digest` flavors take an already-computed
/// digest instead of the raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha1Pkcs,
    RsaSha256Pkcs,
    RsaSha1PkcsDigest,
    RsaSha256PkcsDigest,
}

impl SignatureAlgorithm {
    pub(crate) fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::RsaSha1Pkcs | SignatureAlgorithm::RsaSha1PkcsDigest => {
                DigestAlgorithm::Sha1
            }
            SignatureAlgorithm::RsaSha256Pkcs | SignatureAlgorithm::RsaSha256PkcsDigest => {
                DigestAlgorithm::Sha256
            }
        }
    }

    pub(crate) fn takes_digest(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::RsaSha1PkcsDigest | SignatureAlgorithm::RsaSha256PkcsDigest
        )
    }
}

/// Sign or verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    Sign,
    Verify,
}

/// Random generator flavor. Both draw from the OS CSPRNG here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomAlgorithm {
    TrueRng,
    Prng,
}

/// Root selector for key ladder derivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLadderRoot {
    /// Device-unique root key
    Unique,
    /// Group/shared root; not available on this platform
    Shared,
}
