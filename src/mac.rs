//! MAC sessions (HMAC-SHA1, HMAC-SHA256, CMAC-AES-128) over opaque key
//! references.

use tracing::warn;

use crate::crypto::mac::MacCtx;
use crate::error::{SecError, SecResult};
use crate::key::KeyHandle;
use crate::processor::SecProcessor;
use crate::types::{KeyType, MacAlgorithm, ObjectId};

fn validate_key(key_type: KeyType, algorithm: MacAlgorithm) -> SecResult<()> {
    let ok = match algorithm {
        MacAlgorithm::HmacSha1 | MacAlgorithm::HmacSha256 => key_type.is_hmac(),
        MacAlgorithm::CmacAes128 => key_type == KeyType::Aes128,
    };
    if !ok {
        warn!("not a valid mac key");
        return Err(SecError::InvalidParameters);
    }
    Ok(())
}

/// A streaming MAC session. The key is materialized once at creation and
/// the transient copy zeroized before `new` returns.
pub struct MacHandle {
    algorithm: MacAlgorithm,
    ctx: MacCtx,
}

impl MacHandle {
    pub fn new(key: &KeyHandle<'_>, algorithm: MacAlgorithm) -> SecResult<MacHandle> {
        validate_key(key.key_type(), algorithm)?;
        let sym = key.symmetric_key_bytes()?;
        let ctx = MacCtx::new(algorithm, &sym).map_err(SecError::from)?;
        Ok(MacHandle { algorithm, ctx })
    }

    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }

    pub fn update(&mut self, input: &[u8]) {
        self.ctx.update(input);
    }

    /// Feed the plaintext bytes of another symmetric key into the MAC.
    pub fn update_with_key(&mut self, key: &KeyHandle<'_>) -> SecResult<()> {
        let sym = key.symmetric_key_bytes()?;
        self.ctx.update(&sym);
        Ok(())
    }

    /// Finalize the MAC (16, 20, or 32 bytes) and consume the session.
    pub fn release(self) -> Vec<u8> {
        self.ctx.finish()
    }
}

/// One-shot MAC over a key handle.
pub(crate) fn single_input(
    key: &KeyHandle<'_>,
    algorithm: MacAlgorithm,
    input: &[u8],
) -> SecResult<Vec<u8>> {
    let mut handle = MacHandle::new(key, algorithm)?;
    handle.update(input);
    Ok(handle.release())
}

/// One-shot MAC over a key referenced by object id.
pub(crate) fn single_input_id(
    proc: &SecProcessor,
    algorithm: MacAlgorithm,
    object_id: ObjectId,
    input: &[u8],
) -> SecResult<Vec<u8>> {
    let key = KeyHandle::get_instance(proc, object_id)?;
    single_input(&key, algorithm, input)
}
