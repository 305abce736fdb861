//! Key derivation: HKDF, Concat-KDF, PBKDF2, and the vendor/ladder AES-128
//! derivations. Everything roots at the base key provisioned from the
//! caller nonce; derived material is installed as a fresh object through
//! the normal provisioning path and never returned to the caller.

use zeroize::Zeroizing;

use crate::digest::DigestHandle;
use crate::error::{SecError, SecResult};
use crate::key::KeyHandle;
use crate::ladder::{self, DerivedInputs};
use crate::mac::{self, MacHandle};
use crate::processor::SecProcessor;
use crate::types::{
    object_id, DigestAlgorithm, KeyContainer, KeyLadderRoot, KeyType, MacAlgorithm, ObjectId,
    StorageLoc, AES_BLOCK_SIZE,
};

/// HKDF (RFC 5869 construction driven through MAC sessions).
///
/// Extract computes the PRK with the base MAC key over the salt, matching
/// the hardware contract where the caller never supplies key material
/// directly. Expand is the standard `T(i)` chain.
pub fn derive_hkdf(
    proc: &SecProcessor,
    object_id_derived: ObjectId,
    type_derived: KeyType,
    loc_derived: StorageLoc,
    mac_algorithm: MacAlgorithm,
    nonce: &[u8; 20],
    salt: &[u8],
    info: &[u8],
) -> SecResult<()> {
    if !type_derived.is_symmetric() {
        return Err(SecError::InvalidParameters);
    }

    ladder::provision_base_key(proc, nonce)?;

    let key_length = type_derived.key_len();
    let block_length = mac_algorithm.mac_len();

    // Extract
    let prk = Zeroizing::new(mac::single_input_id(
        proc,
        mac_algorithm,
        object_id::BASE_KEY_MAC,
        salt,
    )?);

    KeyHandle::provision(
        proc,
        object_id::DERIVE_TMP,
        StorageLoc::RamSoftWrapped,
        mac_algorithm.output_key_type().clear_container(),
        &prk,
    )?;

    // Expand
    let expanded = (|| {
        let prk_key = KeyHandle::get_instance(proc, object_id::DERIVE_TMP)?;
        let rounds = key_length.div_ceil(block_length);

        let mut out_key = Zeroizing::new(Vec::with_capacity(key_length));
        let mut t = Zeroizing::new(Vec::new());
        for i in 1..=rounds as u8 {
            let mut mac_handle = MacHandle::new(&prk_key, mac_algorithm)?;
            mac_handle.update(&t);
            mac_handle.update(info);
            mac_handle.update(&[i]);
            *t = mac_handle.release();

            let remaining = key_length - out_key.len();
            out_key.extend_from_slice(&t[..remaining.min(block_length)]);
        }
        Ok::<_, SecError>(out_key)
    })();

    let _ = KeyHandle::delete(proc, object_id::DERIVE_TMP);
    let out_key = expanded?;

    KeyHandle::provision(
        proc,
        object_id_derived,
        loc_derived,
        type_derived.clear_container(),
        &out_key,
    )
}

/// NIST SP 800-56A §5.8.1 concatenation KDF over the base AES key.
pub fn derive_concat_kdf(
    proc: &SecProcessor,
    object_id_derived: ObjectId,
    type_derived: KeyType,
    loc_derived: StorageLoc,
    digest_algorithm: DigestAlgorithm,
    nonce: &[u8; 20],
    other_info: &[u8],
) -> SecResult<()> {
    if !type_derived.is_symmetric() {
        return Err(SecError::InvalidParameters);
    }

    ladder::provision_base_key(proc, nonce)?;

    let key_length = type_derived.key_len();
    let digest_length = digest_algorithm.digest_len();
    let rounds = key_length.div_ceil(digest_length);

    let base_key = KeyHandle::get_instance(proc, object_id::BASE_KEY_AES)?;

    let mut out_key = Zeroizing::new(Vec::with_capacity(key_length));
    for i in 1..=rounds as u32 {
        let mut digest_handle = DigestHandle::new(digest_algorithm);
        digest_handle.update(&i.to_be_bytes());
        digest_handle.update_with_key(&base_key)?;
        digest_handle.update(other_info);
        let hash = Zeroizing::new(digest_handle.release());

        let remaining = key_length - out_key.len();
        out_key.extend_from_slice(&hash[..remaining.min(digest_length)]);
    }

    KeyHandle::provision(
        proc,
        object_id_derived,
        loc_derived,
        type_derived.clear_container(),
        &out_key,
    )
}

/// PBKDF2 (RFC 2898) with the base MAC key as the password.
pub fn derive_pbekdf(
    proc: &SecProcessor,
    object_id_derived: ObjectId,
    type_derived: KeyType,
    loc_derived: StorageLoc,
    mac_algorithm: MacAlgorithm,
    nonce: &[u8; 20],
    salt: &[u8],
    num_iterations: usize,
) -> SecResult<()> {
    if !type_derived.is_symmetric() {
        return Err(SecError::InvalidParameters);
    }

    ladder::provision_base_key(proc, nonce)?;

    let key_length = type_derived.key_len();
    let block_length = mac_algorithm.mac_len();
    let blocks = key_length.div_ceil(block_length);

    let base_key = KeyHandle::get_instance(proc, object_id::BASE_KEY_MAC)?;

    let mut out_key = Zeroizing::new(Vec::with_capacity(key_length));
    for i in 1..=blocks as u32 {
        let mut mac_handle = MacHandle::new(&base_key, mac_algorithm)?;
        mac_handle.update(salt);
        mac_handle.update(&i.to_be_bytes());
        let mut u = Zeroizing::new(mac_handle.release());

        let mut accum = u.clone();
        for _ in 1..num_iterations {
            *u = mac::single_input(&base_key, mac_algorithm, &u)?;
            for (a, b) in accum.iter_mut().zip(u.iter()) {
                *a ^= b;
            }
        }

        let remaining = key_length - out_key.len();
        out_key.extend_from_slice(&accum[..remaining.min(block_length)]);
    }

    KeyHandle::provision(
        proc,
        object_id_derived,
        loc_derived,
        type_derived.clear_container(),
        &out_key,
    )
}

/// Vendor AES-128 derivation: the SHA-256 of the input becomes the two
/// ladder inputs of a derived container.
pub fn derive_vendor_aes128(
    proc: &SecProcessor,
    object_id_derived: ObjectId,
    loc_derived: StorageLoc,
    input: &[u8],
) -> SecResult<()> {
    let digest = Zeroizing::new(crate::digest::single_input(DigestAlgorithm::Sha256, input)?);
    let derived = DerivedInputs {
        input1: digest[..AES_BLOCK_SIZE].try_into().unwrap(),
        input2: digest[AES_BLOCK_SIZE..].try_into().unwrap(),
    };
    KeyHandle::provision(
        proc,
        object_id_derived,
        loc_derived,
        KeyContainer::Derived,
        &derived.to_bytes(),
    )
}

/// Install caller-supplied ladder inputs as a derived AES-128 key. Only
/// the two-stage device-unique root exists on this platform.
pub fn derive_key_ladder_aes128(
    proc: &SecProcessor,
    object_id_derived: ObjectId,
    loc_derived: StorageLoc,
    root: KeyLadderRoot,
    input1: Option<&[u8; AES_BLOCK_SIZE]>,
    input2: Option<&[u8; AES_BLOCK_SIZE]>,
    input3: Option<&[u8; AES_BLOCK_SIZE]>,
    input4: Option<&[u8; AES_BLOCK_SIZE]>,
) -> SecResult<()> {
    if root != KeyLadderRoot::Unique {
        return Err(SecError::UnimplementedFeature);
    }
    let (input1, input2) = match (input1, input2, input3, input4) {
        (Some(input1), Some(input2), None, None) => (input1, input2),
        _ => return Err(SecError::Failure),
    };

    let derived = DerivedInputs {
        input1: *input1,
        input2: *input2,
    };
    KeyHandle::provision(
        proc,
        object_id_derived,
        loc_derived,
        KeyContainer::Derived,
        &derived.to_bytes(),
    )
}

/// Digest of the base key for `nonce`; lets callers prove base-key
/// agreement without seeing the key.
pub fn compute_base_key_digest(
    proc: &SecProcessor,
    nonce: &[u8; 20],
    algorithm: DigestAlgorithm,
) -> SecResult<Vec<u8>> {
    ladder::provision_base_key(proc, nonce)?;

    let base_key = KeyHandle::get_instance(proc, object_id::BASE_KEY_MAC)?;
    let clear = base_key.symmetric_key_bytes()?;
    crate::digest::single_input(algorithm, &clear)
}
