//! Two-stage AES key ladder rooted at the device key.
//!
//! `derive` models the hardware unwrap path: on a secure chip these steps
//! run inside the key ladder engine and the intermediates never reach the
//! host. Here they live in zeroizing stack buffers for the duration of the
//! call.

use zeroize::{Zeroize, Zeroizing};

use crate::cipher::CipherHandle;
use crate::crypto::aes::AesCipher;
use crate::crypto::digest;
use crate::error::{SecError, SecResult};
use crate::key::KeyHandle;
use crate::processor::SecProcessor;
use crate::types::{
    object_id, CipherAlgorithm, CipherMode, DigestAlgorithm, KeyContainer, StorageLoc,
    AES_BLOCK_SIZE,
};

/// Serialized size of [`DerivedInputs`].
pub const DERIVED_INPUTS_LEN: usize = 2 * AES_BLOCK_SIZE;

/// Ladder input pair stored inside a `Derived` container.
#[derive(Clone, Zeroize, zeroize::ZeroizeOnDrop)]
pub struct DerivedInputs {
    pub input1: [u8; AES_BLOCK_SIZE],
    pub input2: [u8; AES_BLOCK_SIZE],
}

impl DerivedInputs {
    pub fn to_bytes(&self) -> [u8; DERIVED_INPUTS_LEN] {
        let mut out = [0u8; DERIVED_INPUTS_LEN];
        out[..AES_BLOCK_SIZE].copy_from_slice(&self.input1);
        out[AES_BLOCK_SIZE..].copy_from_slice(&self.input2);
        out
    }

    pub fn from_bytes(data: &[u8]) -> SecResult<Self> {
        if data.len() != DERIVED_INPUTS_LEN {
            return Err(SecError::InvalidParameters);
        }
        Ok(DerivedInputs {
            input1: data[..AES_BLOCK_SIZE].try_into().unwrap(),
            input2: data[AES_BLOCK_SIZE..].try_into().unwrap(),
        })
    }
}

impl std::fmt::Debug for DerivedInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DerivedInputs([REDACTED])")
    }
}

/// Materialize a key from its ladder inputs:
/// `AES-ECB(AES-ECB(input1; root); input2)`.
pub(crate) fn derive(
    root_key: &[u8; AES_BLOCK_SIZE],
    inputs: &DerivedInputs,
) -> SecResult<Zeroizing<[u8; AES_BLOCK_SIZE]>> {
    let stage1_cipher = AesCipher::new(root_key).map_err(SecError::from)?;
    let mut stage1 = Zeroizing::new(inputs.input1);
    stage1_cipher.encrypt_block(&mut stage1);

    let stage2_cipher = AesCipher::new(&stage1[..]).map_err(SecError::from)?;
    let mut out = Zeroizing::new(inputs.input2);
    stage2_cipher.encrypt_block(&mut out);

    Ok(out)
}

/// Compute the four base-key ladder inputs from the caller nonce:
/// `c_i = SHA-1(BE32(i) || input_derivation_str || cipher_algorithm_str ||
/// nonce)[..16]`.
pub(crate) fn compute_base_key_ladder_inputs(
    input_derivation_str: &str,
    cipher_algorithm_str: &str,
    nonce: &[u8; 20],
) -> [[u8; AES_BLOCK_SIZE]; 4] {
    let mut out = [[0u8; AES_BLOCK_SIZE]; 4];
    for (i, c) in out.iter_mut().enumerate() {
        let mut ctx = digest::DigestCtx::new(DigestAlgorithm::Sha1);
        ctx.update(&(i as u32 + 1).to_be_bytes());
        ctx.update(input_derivation_str.as_bytes());
        ctx.update(cipher_algorithm_str.as_bytes());
        ctx.update(nonce);
        let mut d = Zeroizing::new(ctx.finish());
        c.copy_from_slice(&d[..AES_BLOCK_SIZE]);
        d.zeroize();
    }
    out
}

/// Run the deterministic base-key recipe for `nonce` and install the result
/// as `BASE_KEY_AES` and `BASE_KEY_MAC`.
///
/// Each iteration drives the normal cipher path through a scratch key at
/// `DERIVE_TMP`, the same way a hardware ladder would be exercised stage by
/// stage. Re-running with the same nonce reproduces the same base key.
pub(crate) fn provision_base_key(proc: &SecProcessor, nonce: &[u8; 20]) -> SecResult<()> {
    let inputs = compute_base_key_ladder_inputs("sivSha1", "aesEcbNone", nonce);

    let mut cipher_key = Zeroizing::new(proc.root_key());
    for c in &inputs {
        KeyHandle::provision(
            proc,
            object_id::DERIVE_TMP,
            StorageLoc::Ram,
            KeyContainer::RawAes128,
            &cipher_key[..],
        )?;

        let step = (|| {
            let key = KeyHandle::get_instance(proc, object_id::DERIVE_TMP)?;
            let mut cipher =
                CipherHandle::new(&key, CipherAlgorithm::AesEcbNoPadding, CipherMode::Encrypt, None)?;
            let mut output = [0u8; AES_BLOCK_SIZE];
            cipher.process(c, true, Some(&mut output))?;
            Ok::<_, SecError>(output)
        })();

        let _ = KeyHandle::delete(proc, object_id::DERIVE_TMP);
        *cipher_key = step?;
    }

    KeyHandle::provision(
        proc,
        object_id::BASE_KEY_AES,
        StorageLoc::Ram,
        KeyContainer::RawAes128,
        &cipher_key[..],
    )?;
    KeyHandle::provision(
        proc,
        object_id::BASE_KEY_MAC,
        StorageLoc::RamSoftWrapped,
        KeyContainer::RawHmac128,
        &cipher_key[..],
    )?;

    Ok(())
}

/// Derive the ladder inputs protecting the secure store itself. Bound to
/// the device id so two devices never share store keys.
pub(crate) fn generate_store_ladder_inputs(proc: &SecProcessor, domain: &[u8]) -> DerivedInputs {
    let mut ctx = digest::DigestCtx::new(DigestAlgorithm::Sha256);
    ctx.update(domain);
    ctx.update(&proc.device_id());
    let d = Zeroizing::new(ctx.finish());
    DerivedInputs {
        input1: d[..AES_BLOCK_SIZE].try_into().unwrap(),
        input2: d[AES_BLOCK_SIZE..].try_into().unwrap(),
    }
}
