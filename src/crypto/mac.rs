// SecAPI MAC Primitives
// HMAC-SHA1/SHA256 and CMAC-AES-128 streaming contexts.

use aes::Aes128;
use cmac::Cmac;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::crypto::{CryptoError, CryptoResult};
use crate::types::MacAlgorithm;

/// Streaming MAC context.
pub enum MacCtx {
    HmacSha1(Hmac<Sha1>),
    HmacSha256(Hmac<Sha256>),
    CmacAes128(Cmac<Aes128>),
}

impl MacCtx {
    pub fn new(algorithm: MacAlgorithm, key: &[u8]) -> CryptoResult<Self> {
        match algorithm {
            MacAlgorithm::HmacSha1 => Ok(MacCtx::HmacSha1(
                <Hmac<Sha1> as Mac>::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            MacAlgorithm::HmacSha256 => Ok(MacCtx::HmacSha256(
                <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            MacAlgorithm::CmacAes128 => Ok(MacCtx::CmacAes128(
                <Cmac<Aes128> as Mac>::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
        }
    }

    pub fn update(&mut self, input: &[u8]) {
        match self {
            MacCtx::HmacSha1(ctx) => ctx.update(input),
            MacCtx::HmacSha256(ctx) => ctx.update(input),
            MacCtx::CmacAes128(ctx) => ctx.update(input),
        }
    }

    /// Finalize and return the MAC (20, 32, or 16 bytes).
    pub fn finish(self) -> Vec<u8> {
        match self {
            MacCtx::HmacSha1(ctx) => ctx.finalize().into_bytes().to_vec(),
            MacCtx::HmacSha256(ctx) => ctx.finalize().into_bytes().to_vec(),
            MacCtx::CmacAes128(ctx) => ctx.finalize().into_bytes().to_vec(),
        }
    }
}

/// One-shot MAC.
pub fn mac(algorithm: MacAlgorithm, key: &[u8], input: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut ctx = MacCtx::new(algorithm, key)?;
    ctx.update(input);
    Ok(ctx.finish())
}
