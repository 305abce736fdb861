//! Container codec: normalize incoming key and certificate blobs to their
//! canonical internal forms.
//!
//! Every accepted key container ends up wrapped in the secure store; DER
//! and PEM RSA forms are first re-encoded to the raw structs and fed back
//! through the raw path, mirroring the layered normalization of the
//! original platform code.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::warn;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;
use zeroize::Zeroizing;

use crate::crypto::rsa as rsa_prim;
use crate::error::{SecError, SecResult};
use crate::ladder::DERIVED_INPUTS_LEN;
use crate::processor::SecProcessor;
use crate::repository::{CertificateRecord, KeyInfo, KeyRecord};
use crate::store;
use crate::types::{
    object_id, CertificateContainer, KeyContainer, KeyType, ObjectId, CERTIFICATE_MAX_LEN,
    KEYCONTAINER_MAX_LEN, MAC_MAX_LEN,
};

/// Wrap a normalized clear container into the store and build the record.
fn wrap_key(
    proc: &SecProcessor,
    key_type: KeyType,
    inner: KeyContainer,
    data: &[u8],
) -> SecResult<KeyRecord> {
    let container = store::store_data(proc, true, true, inner.wire_id(), data)?;
    if container.len() > KEYCONTAINER_MAX_LEN {
        warn!("wrapped key container is too long");
        return Err(SecError::Failure);
    }
    Ok(KeyRecord {
        info: KeyInfo {
            key_type,
            container: KeyContainer::Store,
        },
        container,
    })
}

fn check_raw_len(data: &[u8], expected: usize) -> SecResult<()> {
    if data.len() != expected {
        warn!("invalid key container length");
        return Err(SecError::InvalidParameters);
    }
    Ok(())
}

fn parse_private_der(data: &[u8]) -> SecResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(data)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(data))
        .map_err(|e| {
            warn!("invalid RSA private key container: {}", e);
            SecError::InvalidParameters
        })
}

fn parse_private_pem(data: &[u8]) -> SecResult<RsaPrivateKey> {
    let text = std::str::from_utf8(data).map_err(|_| SecError::InvalidParameters)?;
    RsaPrivateKey::from_pkcs1_pem(text)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(text))
        .map_err(|e| {
            warn!("invalid RSA private key container: {}", e);
            SecError::InvalidParameters
        })
}

fn parse_public_der(data: &[u8]) -> SecResult<RsaPublicKey> {
    RsaPublicKey::from_pkcs1_der(data)
        .or_else(|_| RsaPublicKey::from_public_key_der(data))
        .map_err(|e| {
            warn!("invalid RSA public key container: {}", e);
            SecError::InvalidParameters
        })
}

fn parse_public_pem(data: &[u8]) -> SecResult<RsaPublicKey> {
    let text = std::str::from_utf8(data).map_err(|_| SecError::InvalidParameters)?;
    RsaPublicKey::from_public_key_pem(text)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(text))
        .map_err(|e| {
            warn!("invalid RSA public key container: {}", e);
            SecError::InvalidParameters
        })
}

fn check_modulus(size: usize, key_type: KeyType) -> SecResult<()> {
    if size != key_type.key_len() {
        warn!("RSA modulus size does not match the container type");
        return Err(SecError::InvalidParameters);
    }
    Ok(())
}

/// Normalize `data` in `container` form into a wrapped key record.
pub(crate) fn process_key_container(
    proc: &SecProcessor,
    container: KeyContainer,
    data: &[u8],
    object_id: ObjectId,
) -> SecResult<KeyRecord> {
    if object_id == object_id::INVALID {
        warn!("cannot provision an object with the invalid id");
        return Err(SecError::Failure);
    }
    if data.len() > KEYCONTAINER_MAX_LEN {
        warn!("key data is too long");
        return Err(SecError::Failure);
    }

    match container {
        KeyContainer::RawAes128 => {
            check_raw_len(data, 16)?;
            wrap_key(proc, KeyType::Aes128, container, data)
        }
        KeyContainer::RawAes256 => {
            check_raw_len(data, 32)?;
            wrap_key(proc, KeyType::Aes256, container, data)
        }
        KeyContainer::RawHmac128 => {
            check_raw_len(data, 16)?;
            wrap_key(proc, KeyType::Hmac128, container, data)
        }
        KeyContainer::RawHmac160 => {
            check_raw_len(data, 20)?;
            wrap_key(proc, KeyType::Hmac160, container, data)
        }
        KeyContainer::RawHmac256 => {
            check_raw_len(data, 32)?;
            wrap_key(proc, KeyType::Hmac256, container, data)
        }

        KeyContainer::RawRsa1024 | KeyContainer::RawRsa2048 => {
            let key_type = if container == KeyContainer::RawRsa1024 {
                KeyType::Rsa1024
            } else {
                KeyType::Rsa2048
            };
            check_raw_len(data, rsa_prim::RAW_RSA_PRIVATE_KEY_LEN)?;
            let key = rsa_prim::private_key_from_raw(data).map_err(|_| {
                warn!("invalid RSA key container");
                SecError::InvalidParameters
            })?;
            check_modulus(key.size(), key_type)?;
            wrap_key(proc, key_type, container, data)
        }

        KeyContainer::RawRsa1024Public | KeyContainer::RawRsa2048Public => {
            let key_type = if container == KeyContainer::RawRsa1024Public {
                KeyType::Rsa1024Public
            } else {
                KeyType::Rsa2048Public
            };
            check_raw_len(data, rsa_prim::RAW_RSA_PUBLIC_KEY_LEN)?;
            let raw = rsa_prim::RawRsaPublicKey::from_bytes(data)
                .map_err(|_| SecError::InvalidParameters)?;
            let key = rsa_prim::public_key_from_raw(&raw).map_err(|_| {
                warn!("invalid RSA key container");
                SecError::InvalidParameters
            })?;
            check_modulus(key.size(), key_type)?;
            wrap_key(proc, key_type, container, data)
        }

        KeyContainer::DerRsa1024 | KeyContainer::DerRsa2048 => {
            let (key_type, raw_container) = if container == KeyContainer::DerRsa1024 {
                (KeyType::Rsa1024, KeyContainer::RawRsa1024)
            } else {
                (KeyType::Rsa2048, KeyContainer::RawRsa2048)
            };
            let key = parse_private_der(data)?;
            check_modulus(key.size(), key_type)?;
            let raw = rsa_prim::private_key_to_raw(&key).map_err(SecError::from)?;
            process_key_container(proc, raw_container, &raw, object_id)
        }

        KeyContainer::PemRsa1024 | KeyContainer::PemRsa2048 => {
            let (key_type, raw_container) = if container == KeyContainer::PemRsa1024 {
                (KeyType::Rsa1024, KeyContainer::RawRsa1024)
            } else {
                (KeyType::Rsa2048, KeyContainer::RawRsa2048)
            };
            let key = parse_private_pem(data)?;
            check_modulus(key.size(), key_type)?;
            let raw = rsa_prim::private_key_to_raw(&key).map_err(SecError::from)?;
            process_key_container(proc, raw_container, &raw, object_id)
        }

        KeyContainer::DerRsa1024Public | KeyContainer::DerRsa2048Public => {
            let (key_type, raw_container) = if container == KeyContainer::DerRsa1024Public {
                (KeyType::Rsa1024Public, KeyContainer::RawRsa1024Public)
            } else {
                (KeyType::Rsa2048Public, KeyContainer::RawRsa2048Public)
            };
            let key = parse_public_der(data)?;
            check_modulus(key.size(), key_type)?;
            let raw = rsa_prim::public_key_to_raw(&key).map_err(SecError::from)?;
            process_key_container(proc, raw_container, &raw.to_bytes(), object_id)
        }

        KeyContainer::PemRsa1024Public | KeyContainer::PemRsa2048Public => {
            let (key_type, raw_container) = if container == KeyContainer::PemRsa1024Public {
                (KeyType::Rsa1024Public, KeyContainer::RawRsa1024Public)
            } else {
                (KeyType::Rsa2048Public, KeyContainer::RawRsa2048Public)
            };
            let key = parse_public_pem(data)?;
            check_modulus(key.size(), key_type)?;
            let raw = rsa_prim::public_key_to_raw(&key).map_err(SecError::from)?;
            process_key_container(proc, raw_container, &raw.to_bytes(), object_id)
        }

        KeyContainer::Derived => {
            check_raw_len(data, DERIVED_INPUTS_LEN)?;
            wrap_key(proc, KeyType::Aes128, container, data)
        }

        KeyContainer::Store => {
            if store::store_len(data)? != data.len() {
                warn!("secure store length does not match the expected one");
                return Err(SecError::Failure);
            }
            let header = store::validate(proc, false, data)?;
            let key_type = key_type_for_inner(header.inner_container_type)?;
            Ok(KeyRecord {
                info: KeyInfo {
                    key_type,
                    container: KeyContainer::Store,
                },
                container: data.to_vec(),
            })
        }

        KeyContainer::Extension(id) => match proc.custom_container() {
            Some(handler) => {
                let (next_container, next_data) = handler.process(id, data, object_id)?;
                if matches!(next_container, KeyContainer::Extension(_)) {
                    return Err(SecError::UnimplementedFeature);
                }
                let next_data = Zeroizing::new(next_data);
                process_key_container(proc, next_container, &next_data, object_id)
            }
            None => {
                warn!("unimplemented key container type");
                Err(SecError::UnimplementedFeature)
            }
        },
    }
}

/// Key type implied by the inner container tag of a store blob.
fn key_type_for_inner(inner: u32) -> SecResult<KeyType> {
    let container = [
        KeyContainer::RawAes128,
        KeyContainer::RawAes256,
        KeyContainer::RawHmac128,
        KeyContainer::RawHmac160,
        KeyContainer::RawHmac256,
        KeyContainer::RawRsa1024,
        KeyContainer::RawRsa2048,
        KeyContainer::RawRsa1024Public,
        KeyContainer::RawRsa2048Public,
        KeyContainer::Derived,
    ]
    .into_iter()
    .find(|c| c.wire_id() == inner)
    .ok_or(SecError::InvalidParameters)?;

    Ok(match container {
        KeyContainer::RawAes128 | KeyContainer::Derived => KeyType::Aes128,
        KeyContainer::RawAes256 => KeyType::Aes256,
        KeyContainer::RawHmac128 => KeyType::Hmac128,
        KeyContainer::RawHmac160 => KeyType::Hmac160,
        KeyContainer::RawHmac256 => KeyType::Hmac256,
        KeyContainer::RawRsa1024 => KeyType::Rsa1024,
        KeyContainer::RawRsa2048 => KeyType::Rsa2048,
        KeyContainer::RawRsa1024Public => KeyType::Rsa1024Public,
        KeyContainer::RawRsa2048Public => KeyType::Rsa2048Public,
        _ => unreachable!(),
    })
}

/// Normalize a certificate blob to canonical DER and MAC it with the
/// certificate-store key.
pub(crate) fn process_certificate_container(
    proc: &SecProcessor,
    container: CertificateContainer,
    data: &[u8],
) -> SecResult<CertificateRecord> {
    let der: Vec<u8> = match container {
        CertificateContainer::X509Der => {
            let (rem, _) = parse_x509_certificate(data).map_err(|e| {
                warn!("invalid X.509 certificate container: {}", e);
                SecError::InvalidParameters
            })?;
            data[..data.len() - rem.len()].to_vec()
        }
        CertificateContainer::X509Pem => {
            let (_, pem) = parse_x509_pem(data).map_err(|e| {
                warn!("invalid X.509 certificate container: {}", e);
                SecError::InvalidParameters
            })?;
            parse_x509_certificate(&pem.contents).map_err(|e| {
                warn!("invalid X.509 certificate container: {}", e);
                SecError::InvalidParameters
            })?;
            pem.contents
        }
    };

    if der.len() > CERTIFICATE_MAX_LEN {
        warn!("certificate is too large");
        return Err(SecError::InvalidParameters);
    }

    let mut record = CertificateRecord {
        cert: der,
        mac: [0u8; MAC_MAX_LEN],
    };
    sign_certificate_record(proc, &mut record)?;
    Ok(record)
}

/// MAC the canonical DER under the certificate-store key.
pub(crate) fn sign_certificate_record(
    proc: &SecProcessor,
    record: &mut CertificateRecord,
) -> SecResult<()> {
    let mac = crate::mac::single_input_id(
        proc,
        crate::types::MacAlgorithm::HmacSha256,
        object_id::CERTSTORE_KEY,
        &record.cert,
    )?;
    record.mac.copy_from_slice(&mac);
    Ok(())
}

/// Recompute and compare the certificate-store MAC.
pub(crate) fn validate_certificate_record(
    proc: &SecProcessor,
    record: &CertificateRecord,
) -> SecResult<()> {
    use subtle::ConstantTimeEq;

    let mac = crate::mac::single_input_id(
        proc,
        crate::types::MacAlgorithm::HmacSha256,
        object_id::CERTSTORE_KEY,
        &record.cert,
    )?;
    if !bool::from(mac.ct_eq(&record.mac)) {
        warn!("certificate MAC does not match the expected value");
        return Err(SecError::VerificationFailed);
    }
    Ok(())
}
