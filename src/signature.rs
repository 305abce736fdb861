//! RSA PKCS#1 v1.5 signature sessions.
//!
//! The `Digest` algorithm flavors take the already-computed digest as
//! input; the plain flavors hash internally. Verification failure is
//! reported distinctly from operational failure.

use tracing::warn;

use crate::crypto::rsa as rsa_prim;
use crate::digest;
use crate::error::{SecError, SecResult};
use crate::key::{KeyHandle, RsaKeyMaterial};
use crate::types::{SignatureAlgorithm, SignatureMode};

/// A signature session bound to an RSA key reference.
pub struct SignatureHandle<'a, 'p> {
    key: &'a KeyHandle<'p>,
    algorithm: SignatureAlgorithm,
    mode: SignatureMode,
}

impl<'a, 'p> SignatureHandle<'a, 'p> {
    pub fn new(
        key: &'a KeyHandle<'p>,
        algorithm: SignatureAlgorithm,
        mode: SignatureMode,
    ) -> SecResult<SignatureHandle<'a, 'p>> {
        if !key.key_type().is_rsa() {
            return Err(SecError::InvalidParameters);
        }
        if mode == SignatureMode::Sign && !key.key_type().is_private() {
            return Err(SecError::InvalidParameters);
        }
        Ok(SignatureHandle {
            key,
            algorithm,
            mode,
        })
    }

    /// Sign `input` into `signature`, or verify `signature` over `input`,
    /// depending on the session mode. Returns the signature length, which
    /// always equals the modulus size.
    pub fn process(&self, input: &[u8], signature: &mut [u8]) -> SecResult<usize> {
        let digest_algorithm = self.algorithm.digest_algorithm();
        let signature_len = self.key.key_len();
        if signature.len() < signature_len {
            return Err(SecError::BufferTooSmall);
        }

        let digest = if self.algorithm.takes_digest() {
            if input.len() != digest_algorithm.digest_len() {
                warn!("invalid input length for a digest signature");
                return Err(SecError::Failure);
            }
            input.to_vec()
        } else {
            digest::single_input(digest_algorithm, input)?
        };

        match self.mode {
            SignatureMode::Sign => {
                let material = self.key.rsa_material()?;
                let private = match &material {
                    RsaKeyMaterial::Private(key) => key,
                    RsaKeyMaterial::Public(_) => return Err(SecError::Failure),
                };
                let sig = rsa_prim::sign_digest(private, digest_algorithm, &digest)
                    .map_err(SecError::from)?;
                signature[..sig.len()].copy_from_slice(&sig);
                Ok(sig.len())
            }
            SignatureMode::Verify => {
                let material = self.key.rsa_material()?;
                rsa_prim::verify_digest(
                    &material.public_key(),
                    digest_algorithm,
                    &digest,
                    &signature[..signature_len],
                )
                .map_err(|_| SecError::VerificationFailed)?;
                Ok(signature_len)
            }
        }
    }

    /// Consume the session.
    pub fn release(self) {}
}
