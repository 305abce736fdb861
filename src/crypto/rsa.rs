// SecAPI RSA Primitives
//
// Conversions between the fixed-layout raw key structs used on the wire and
// the `rsa` crate types, plus the PKCS#1 v1.5 / OAEP-SHA1 operations the
// cipher and signature handles need. Private material is only ever returned
// inside zeroizing buffers.

use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, CryptoResult};
use crate::types::DigestAlgorithm;

/// Largest supported modulus in bytes (RSA-2048).
pub const RSA_KEY_MAX_LEN: usize = 256;
/// Largest supported prime/CRT component in bytes.
pub const RSA_PRIME_MAX_LEN: usize = RSA_KEY_MAX_LEN / 2;
/// Public exponent field width.
pub const RSA_EXPONENT_LEN: usize = 4;

/// Serialized size of [`RawRsaPrivateKey`].
pub const RAW_RSA_PRIVATE_KEY_LEN: usize =
    4 + RSA_KEY_MAX_LEN + RSA_EXPONENT_LEN + RSA_KEY_MAX_LEN + 5 * RSA_PRIME_MAX_LEN;
/// Serialized size of [`RawRsaPublicKey`].
pub const RAW_RSA_PUBLIC_KEY_LEN: usize = 4 + RSA_KEY_MAX_LEN + RSA_EXPONENT_LEN;

/// Raw RSA public key: `modulus_len_be(4) || n(256) || e(4)`.
///
/// Each big integer is big-endian and occupies the leading `modulus_len`
/// bytes of its field; unused tail bytes are zero.
#[derive(Clone, PartialEq, Eq)]
pub struct RawRsaPublicKey {
    pub modulus_len_be: [u8; 4],
    pub n: [u8; RSA_KEY_MAX_LEN],
    pub e: [u8; RSA_EXPONENT_LEN],
}

impl RawRsaPublicKey {
    pub fn modulus_len(&self) -> usize {
        u32::from_be_bytes(self.modulus_len_be) as usize
    }

    /// Modulus bytes, big-endian, trimmed to the declared length.
    pub fn modulus(&self) -> &[u8] {
        &self.n[..self.modulus_len().min(RSA_KEY_MAX_LEN)]
    }

    /// Public exponent bytes, big-endian.
    pub fn exponent(&self) -> &[u8] {
        &self.e
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RAW_RSA_PUBLIC_KEY_LEN);
        out.extend_from_slice(&self.modulus_len_be);
        out.extend_from_slice(&self.n);
        out.extend_from_slice(&self.e);
        out
    }

    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        if data.len() != RAW_RSA_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidInput(format!(
                "raw RSA public key must be {} bytes, got {}",
                RAW_RSA_PUBLIC_KEY_LEN,
                data.len()
            )));
        }
        let mut key = RawRsaPublicKey {
            modulus_len_be: [0u8; 4],
            n: [0u8; RSA_KEY_MAX_LEN],
            e: [0u8; RSA_EXPONENT_LEN],
        };
        key.modulus_len_be.copy_from_slice(&data[..4]);
        key.n.copy_from_slice(&data[4..4 + RSA_KEY_MAX_LEN]);
        key.e.copy_from_slice(&data[4 + RSA_KEY_MAX_LEN..]);
        Ok(key)
    }
}

impl std::fmt::Debug for RawRsaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRsaPublicKey")
            .field("modulus_len", &self.modulus_len())
            .finish_non_exhaustive()
    }
}

fn write_bn(bn: &BigUint, out: &mut [u8], field_len: usize) -> CryptoResult<()> {
    let bytes = bn.to_bytes_be();
    if bytes.len() > field_len {
        return Err(CryptoError::InvalidInput(format!(
            "big integer of {} bytes does not fit field of {}",
            bytes.len(),
            field_len
        )));
    }
    out[field_len - bytes.len()..field_len].copy_from_slice(&bytes);
    Ok(())
}

/// Serialize a private key to the raw wire struct:
/// `modulus_len_be(4) || n || e || d || p || q || dmp1 || dmq1 || iqmp`.
pub fn private_key_to_raw(key: &RsaPrivateKey) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut key = key.clone();
    key.precompute()
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;

    let modulus_len = key.size();
    let primes = key.primes();
    if primes.len() != 2 {
        return Err(CryptoError::InvalidInput(
            "only two-prime RSA keys are supported".to_string(),
        ));
    }

    let dp = key
        .dp()
        .cloned()
        .ok_or_else(|| CryptoError::InvalidInput("missing dP".to_string()))?;
    let dq = key
        .dq()
        .cloned()
        .ok_or_else(|| CryptoError::InvalidInput("missing dQ".to_string()))?;
    let qinv = key
        .crt_coefficient()
        .ok_or_else(|| CryptoError::InvalidInput("missing qInv".to_string()))?;

    let mut out = Zeroizing::new(vec![0u8; RAW_RSA_PRIVATE_KEY_LEN]);
    out[..4].copy_from_slice(&(modulus_len as u32).to_be_bytes());

    let mut off = 4;
    write_bn(key.n(), &mut out[off..off + RSA_KEY_MAX_LEN], modulus_len)?;
    off += RSA_KEY_MAX_LEN;
    write_bn(key.e(), &mut out[off..off + RSA_EXPONENT_LEN], RSA_EXPONENT_LEN)?;
    off += RSA_EXPONENT_LEN;
    write_bn(key.d(), &mut out[off..off + RSA_KEY_MAX_LEN], modulus_len)?;
    off += RSA_KEY_MAX_LEN;

    let prime_len = modulus_len / 2;
    for bn in [&primes[0], &primes[1], &dp, &dq, &qinv] {
        write_bn(bn, &mut out[off..off + RSA_PRIME_MAX_LEN], prime_len)?;
        off += RSA_PRIME_MAX_LEN;
    }

    Ok(out)
}

/// Parse the raw private struct back into a key. CRT components are
/// recomputed from `(n, e, d, p, q)`.
pub fn private_key_from_raw(data: &[u8]) -> CryptoResult<RsaPrivateKey> {
    if data.len() != RAW_RSA_PRIVATE_KEY_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "raw RSA private key must be {} bytes, got {}",
            RAW_RSA_PRIVATE_KEY_LEN,
            data.len()
        )));
    }

    let modulus_len = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
    if modulus_len == 0 || modulus_len > RSA_KEY_MAX_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "invalid modulus length {}",
            modulus_len
        )));
    }
    let prime_len = modulus_len / 2;

    let mut off = 4;
    let n = BigUint::from_bytes_be(&data[off..off + modulus_len]);
    off += RSA_KEY_MAX_LEN;
    let e = BigUint::from_bytes_be(&data[off..off + RSA_EXPONENT_LEN]);
    off += RSA_EXPONENT_LEN;
    let d = BigUint::from_bytes_be(&data[off..off + modulus_len]);
    off += RSA_KEY_MAX_LEN;
    let p = BigUint::from_bytes_be(&data[off..off + prime_len]);
    off += RSA_PRIME_MAX_LEN;
    let q = BigUint::from_bytes_be(&data[off..off + prime_len]);

    RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| CryptoError::KeyParseFailed(e.to_string()))
}

/// Serialize a public key to the raw wire struct.
pub fn public_key_to_raw(key: &RsaPublicKey) -> CryptoResult<RawRsaPublicKey> {
    let modulus_len = key.size();
    let mut raw = RawRsaPublicKey {
        modulus_len_be: (modulus_len as u32).to_be_bytes(),
        n: [0u8; RSA_KEY_MAX_LEN],
        e: [0u8; RSA_EXPONENT_LEN],
    };
    write_bn(key.n(), &mut raw.n, modulus_len)?;
    write_bn(key.e(), &mut raw.e, RSA_EXPONENT_LEN)?;
    Ok(raw)
}

/// Parse the raw public struct back into a key.
pub fn public_key_from_raw(raw: &RawRsaPublicKey) -> CryptoResult<RsaPublicKey> {
    let n = BigUint::from_bytes_be(raw.modulus());
    let e = BigUint::from_bytes_be(raw.exponent());
    RsaPublicKey::new(n, e).map_err(|e| CryptoError::KeyParseFailed(e.to_string()))
}

/// Generate a fresh key pair with exponent 65537.
pub fn generate(bits: usize) -> CryptoResult<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
}

/// RSA public encrypt. `oaep` selects OAEP-SHA1, otherwise PKCS#1 v1.5.
pub fn public_encrypt(key: &RsaPublicKey, oaep: bool, input: &[u8]) -> CryptoResult<Vec<u8>> {
    let result = if oaep {
        key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), input)
    } else {
        key.encrypt(&mut OsRng, Pkcs1v15Encrypt, input)
    };
    result.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// RSA private decrypt, counterpart of [`public_encrypt`].
pub fn private_decrypt(
    key: &RsaPrivateKey,
    oaep: bool,
    input: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let result = if oaep {
        key.decrypt(Oaep::new::<Sha1>(), input)
    } else {
        key.decrypt(Pkcs1v15Encrypt, input)
    };
    result
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// PKCS#1 v1.5 signature over an already-computed digest.
pub fn sign_digest(
    key: &RsaPrivateKey,
    algorithm: DigestAlgorithm,
    digest: &[u8],
) -> CryptoResult<Vec<u8>> {
    let scheme = match algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
    };
    key.sign(scheme, digest)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))
}

/// PKCS#1 v1.5 verification over an already-computed digest.
pub fn verify_digest(
    key: &RsaPublicKey,
    algorithm: DigestAlgorithm,
    digest: &[u8],
    signature: &[u8],
) -> CryptoResult<()> {
    let scheme = match algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
    };
    key.verify(scheme, digest, signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest::digest;

    fn test_key() -> RsaPrivateKey {
        generate(1024).unwrap()
    }

    #[test]
    fn test_private_raw_roundtrip() {
        let key = test_key();
        let raw = private_key_to_raw(&key).unwrap();
        assert_eq!(raw.len(), RAW_RSA_PRIVATE_KEY_LEN);

        let restored = private_key_from_raw(&raw).unwrap();
        assert_eq!(restored.n(), key.n());
        assert_eq!(restored.e(), key.e());
        assert_eq!(restored.d(), key.d());
    }

    #[test]
    fn test_public_raw_roundtrip() {
        let key = test_key().to_public_key();
        let raw = public_key_to_raw(&key).unwrap();
        assert_eq!(raw.modulus_len(), 128);

        let restored = public_key_from_raw(&raw).unwrap();
        assert_eq!(restored.n(), key.n());
        assert_eq!(restored.e(), key.e());
    }

    #[test]
    fn test_encrypt_decrypt_both_paddings() {
        let key = test_key();
        let public = key.to_public_key();

        for oaep in [false, true] {
            let ct = public_encrypt(&public, oaep, b"sixteen byte msg").unwrap();
            assert_eq!(ct.len(), 128);
            let pt = private_decrypt(&key, oaep, &ct).unwrap();
            assert_eq!(&pt[..], b"sixteen byte msg");
        }
    }

    #[test]
    fn test_sign_verify() {
        let key = test_key();
        let public = key.to_public_key();
        let d = digest(DigestAlgorithm::Sha256, b"message");

        let sig = sign_digest(&key, DigestAlgorithm::Sha256, &d).unwrap();
        assert_eq!(sig.len(), 128);
        verify_digest(&public, DigestAlgorithm::Sha256, &d, &sig).unwrap();

        let wrong = digest(DigestAlgorithm::Sha256, b"other message");
        assert!(verify_digest(&public, DigestAlgorithm::Sha256, &wrong, &sig).is_err());
    }
}
