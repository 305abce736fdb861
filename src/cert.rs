//! Certificate objects: X.509 storage with an integrity MAC under the
//! certificate-store key, public key extraction, and signature checks.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use tracing::warn;
use x509_parser::oid_registry::{OID_PKCS1_SHA1WITHRSA, OID_PKCS1_SHA256WITHRSA};
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

use crate::codec;
use crate::crypto::rsa as rsa_prim;
use crate::digest;
use crate::error::{SecError, SecResult};
use crate::key::KeyHandle;
use crate::processor::SecProcessor;
use crate::repository::{self, CertificateRecord};
use crate::types::{object_id, CertificateContainer, DigestAlgorithm, ObjectId, StorageLoc};

/// Opaque reference to a provisioned certificate.
pub struct CertificateHandle<'a> {
    proc: &'a SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: CertificateRecord,
}

impl<'a> CertificateHandle<'a> {
    /// Look up a certificate by id, validating its store MAC.
    pub fn get_instance(
        proc: &'a SecProcessor,
        object_id: ObjectId,
    ) -> SecResult<CertificateHandle<'a>> {
        if object_id == object_id::INVALID {
            warn!("invalid object id");
            return Err(SecError::InvalidParameters);
        }

        let (location, record) = repository::retrieve_certificate_record(proc, object_id)?;
        codec::validate_certificate_record(proc, &record)?;

        Ok(CertificateHandle {
            proc,
            object_id,
            location,
            record,
        })
    }

    /// Normalize and install a certificate at `object_id`, replacing any
    /// existing one.
    pub fn provision(
        proc: &SecProcessor,
        object_id: ObjectId,
        location: StorageLoc,
        container: CertificateContainer,
        data: &[u8],
    ) -> SecResult<()> {
        if object_id == object_id::INVALID {
            warn!("cannot provision an object with the invalid id");
            return Err(SecError::Failure);
        }

        let record = codec::process_certificate_container(proc, container, data)?;
        repository::store_certificate_record(proc, object_id, location, record)
    }

    /// Remove the certificate from every storage tier.
    pub fn delete(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
        repository::delete_certificate(proc, object_id)
    }

    /// Enumerate certificate ids across RAM and the filesystem.
    pub fn list(proc: &SecProcessor, max_items: usize) -> Vec<ObjectId> {
        repository::list_certificates(proc, max_items)
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn location(&self) -> StorageLoc {
        self.location
    }

    pub fn processor(&self) -> &'a SecProcessor {
        self.proc
    }

    /// Copy the DER out. `None` queries the required size; a short buffer
    /// is rejected without writing.
    pub fn export(&self, buffer: Option<&mut [u8]>) -> SecResult<usize> {
        let len = self.record.cert.len();
        match buffer {
            None => Ok(len),
            Some(buffer) => {
                if buffer.len() < len {
                    return Err(SecError::BufferTooSmall);
                }
                buffer[..len].copy_from_slice(&self.record.cert);
                Ok(len)
            }
        }
    }

    fn parsed(&self) -> SecResult<X509Certificate<'_>> {
        let (_, x509) = parse_x509_certificate(&self.record.cert).map_err(|e| {
            warn!("could not parse the stored certificate: {}", e);
            SecError::Failure
        })?;
        Ok(x509)
    }

    /// Extract the embedded RSA public key in raw wire form.
    pub fn extract_public_key(&self) -> SecResult<rsa_prim::RawRsaPublicKey> {
        let x509 = self.parsed()?;
        let spki = x509.public_key();
        let key = RsaPublicKey::from_pkcs1_der(spki.subject_public_key.data.as_ref())
            .map_err(|e| {
                warn!("certificate does not carry an RSA public key: {}", e);
                SecError::Failure
            })?;
        rsa_prim::public_key_to_raw(&key).map_err(SecError::from)
    }

    /// Verify the certificate signature with the public half of `key`.
    pub fn verify(&self, key: &KeyHandle<'_>) -> SecResult<()> {
        let public = key.extract_public_key()?;
        self.verify_with_raw_public_key(&public)
    }

    /// Verify the certificate signature with a caller-supplied raw public
    /// key. Only the SHA-1 and SHA-256 RSA signature algorithms exist here.
    pub fn verify_with_raw_public_key(
        &self,
        public_key: &rsa_prim::RawRsaPublicKey,
    ) -> SecResult<()> {
        let x509 = self.parsed()?;

        let oid = &x509.signature_algorithm.algorithm;
        let digest_algorithm = if *oid == OID_PKCS1_SHA1WITHRSA {
            DigestAlgorithm::Sha1
        } else if *oid == OID_PKCS1_SHA256WITHRSA {
            DigestAlgorithm::Sha256
        } else {
            warn!("unsupported certificate signature algorithm");
            return Err(SecError::UnimplementedFeature);
        };

        let tbs_digest = digest::single_input(digest_algorithm, x509.tbs_certificate.as_ref())?;
        let key = rsa_prim::public_key_from_raw(public_key).map_err(SecError::from)?;
        rsa_prim::verify_digest(
            &key,
            digest_algorithm,
            &tbs_digest,
            x509.signature_value.data.as_ref(),
        )
        .map_err(|_| SecError::VerificationFailed)
    }

    /// Consume the handle.
    pub fn release(self) {}
}

impl std::fmt::Debug for CertificateHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateHandle")
            .field("object_id", &self.object_id)
            .field("location", &self.location)
            .field("cert_len", &self.record.cert.len())
            .finish()
    }
}
