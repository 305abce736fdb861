//! Digest sessions (SHA-1, SHA-256).

use crate::crypto::digest::DigestCtx;
use crate::error::SecResult;
use crate::key::KeyHandle;
use crate::types::DigestAlgorithm;

/// A streaming digest session. `release` finalizes and consumes it.
pub struct DigestHandle {
    algorithm: DigestAlgorithm,
    ctx: DigestCtx,
}

impl DigestHandle {
    pub fn new(algorithm: DigestAlgorithm) -> DigestHandle {
        DigestHandle {
            algorithm,
            ctx: DigestCtx::new(algorithm),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn update(&mut self, input: &[u8]) {
        self.ctx.update(input);
    }

    /// Feed the plaintext bytes of a symmetric key into the digest. The
    /// transient copy is zeroized before this returns.
    pub fn update_with_key(&mut self, key: &KeyHandle<'_>) -> SecResult<()> {
        let sym = key.symmetric_key_bytes()?;
        self.ctx.update(&sym);
        Ok(())
    }

    /// Finalize the digest (20 or 32 bytes) and consume the session.
    pub fn release(self) -> Vec<u8> {
        self.ctx.finish()
    }
}

/// One-shot digest through the session machinery.
pub(crate) fn single_input(algorithm: DigestAlgorithm, input: &[u8]) -> SecResult<Vec<u8>> {
    let mut handle = DigestHandle::new(algorithm);
    handle.update(input);
    Ok(handle.release())
}
