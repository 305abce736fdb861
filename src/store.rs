//! Secure store: the authenticated, optionally encrypted container every
//! persisted key travels in.
//!
//! Blob layout (all integers little-endian):
//!
//! ```text
//! magic[8] = "SECSTOR1"
//! header {
//!     inner_container_type : u32   // wire id of the wrapped container
//!     data_len             : u32   // plaintext payload length
//!     flags                : u32   // bit0 ENCRYPTED, bit1 MAC_PRESENT
//! }
//! payload                          // iv[16] || AES-128-CBC-PKCS7 ciphertext
//!                                  // when encrypted, raw data otherwise
//! mac[16]                          // CMAC-AES-128 over magic|header|payload
//! ```
//!
//! The AES and CMAC keys are the reserved store keys, themselves derived
//! containers materialized through the key ladder on every use.

use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::aes::{self, AesCipher};
use crate::crypto::mac as mac_prim;
use crate::error::{SecError, SecResult};
use crate::key;
use crate::processor::SecProcessor;
use crate::types::{object_id, MacAlgorithm, AES_BLOCK_SIZE};

/// Magic prefix of every store blob.
pub const KEYSTORE_MAGIC: &[u8; 8] = b"SECSTOR1";

const HEADER_LEN: usize = 12;
const MAC_LEN: usize = 16;
const MAGIC_LEN: usize = 8;

const FLAG_ENCRYPTED: u32 = 1 << 0;
const FLAG_MAC_PRESENT: u32 = 1 << 1;

/// Parsed store header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub inner_container_type: u32,
    pub data_len: u32,
    pub flags: u32,
}

impl StoreHeader {
    pub fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn mac_present(&self) -> bool {
        self.flags & FLAG_MAC_PRESENT != 0
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.inner_container_type.to_le_bytes());
        out[4..8].copy_from_slice(&self.data_len.to_le_bytes());
        out[8..12].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    fn from_bytes(data: &[u8; HEADER_LEN]) -> Self {
        StoreHeader {
            inner_container_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            data_len: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            flags: u32::from_le_bytes(data[8..12].try_into().unwrap()),
        }
    }

    /// Length of the payload region as dictated by the header fields.
    fn payload_region_len(&self) -> usize {
        let data_len = self.data_len as usize;
        if self.encrypted() {
            AES_BLOCK_SIZE + (data_len / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE
        } else {
            data_len
        }
    }

    /// Total blob length declared by the header.
    fn declared_store_len(&self) -> usize {
        MAGIC_LEN + HEADER_LEN + self.payload_region_len() + MAC_LEN
    }
}

/// Parse and sanity-check the header of a store blob.
pub fn header(blob: &[u8]) -> SecResult<StoreHeader> {
    if blob.len() < MAGIC_LEN + HEADER_LEN + MAC_LEN {
        return Err(SecError::InvalidParameters);
    }
    if &blob[..MAGIC_LEN] != KEYSTORE_MAGIC {
        return Err(SecError::InvalidParameters);
    }
    let raw: [u8; HEADER_LEN] = blob[MAGIC_LEN..MAGIC_LEN + HEADER_LEN].try_into().unwrap();
    Ok(StoreHeader::from_bytes(&raw))
}

/// Total length the blob declares for itself.
pub fn store_len(blob: &[u8]) -> SecResult<usize> {
    Ok(header(blob)?.declared_store_len())
}

/// Plaintext payload length declared by the blob.
pub fn data_len(blob: &[u8]) -> SecResult<usize> {
    Ok(header(blob)?.data_len as usize)
}

fn store_aes_key(proc: &SecProcessor) -> SecResult<Zeroizing<Vec<u8>>> {
    let record = proc.key_record(object_id::STORE_AES_KEY)?;
    key::symmetric_from_record(proc, &record)
}

fn store_mac_key(proc: &SecProcessor) -> SecResult<Zeroizing<Vec<u8>>> {
    let record = proc.key_record(object_id::STORE_MACKEYGEN_KEY)?;
    key::symmetric_from_record(proc, &record)
}

/// Wrap `payload` into a store blob.
pub(crate) fn store_data(
    proc: &SecProcessor,
    encrypt: bool,
    sign: bool,
    inner_container_type: u32,
    payload: &[u8],
) -> SecResult<Vec<u8>> {
    if payload.len() > u32::MAX as usize {
        return Err(SecError::InvalidParameters);
    }

    let mut flags = 0;
    if encrypt {
        flags |= FLAG_ENCRYPTED;
    }
    if sign {
        flags |= FLAG_MAC_PRESENT;
    }
    let header = StoreHeader {
        inner_container_type,
        data_len: payload.len() as u32,
        flags,
    };

    let mut blob = Vec::with_capacity(header.declared_store_len());
    blob.extend_from_slice(KEYSTORE_MAGIC);
    blob.extend_from_slice(&header.to_bytes());

    if encrypt {
        let aes_key = store_aes_key(proc)?;
        let cipher = AesCipher::new(&aes_key).map_err(SecError::from)?;

        let mut iv = [0u8; AES_BLOCK_SIZE];
        crate::crypto::random::fill_random(&mut iv);

        let full = payload.len() / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
        let mut region = Zeroizing::new(Vec::with_capacity(header.payload_region_len()));
        region.extend_from_slice(&payload[..full]);
        region.extend_from_slice(&aes::pkcs7_pad_block(&payload[full..]));

        let mut chain = iv;
        aes::cbc_encrypt(&cipher, &mut chain, &mut region[..]).map_err(SecError::from)?;

        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&region);
    } else {
        blob.extend_from_slice(payload);
    }

    if sign {
        let mac_key = store_mac_key(proc)?;
        let mac =
            mac_prim::mac(MacAlgorithm::CmacAes128, &mac_key, &blob).map_err(SecError::from)?;
        blob.extend_from_slice(&mac);
    } else {
        blob.extend_from_slice(&[0u8; MAC_LEN]);
    }

    Ok(blob)
}

/// Check the magic, declared lengths, and (when present) the MAC.
pub(crate) fn validate(proc: &SecProcessor, require_mac: bool, blob: &[u8]) -> SecResult<StoreHeader> {
    let header = header(blob)?;
    if header.declared_store_len() != blob.len() {
        return Err(SecError::InvalidParameters);
    }

    if header.mac_present() {
        let mac_key = store_mac_key(proc)?;
        let signed = &blob[..blob.len() - MAC_LEN];
        let expected =
            mac_prim::mac(MacAlgorithm::CmacAes128, &mac_key, signed).map_err(SecError::from)?;
        let actual = &blob[blob.len() - MAC_LEN..];
        if !bool::from(expected.ct_eq(actual)) {
            warn!("secure store MAC does not match the expected value");
            return Err(SecError::VerificationFailed);
        }
    } else if require_mac {
        return Err(SecError::VerificationFailed);
    }

    Ok(header)
}

/// Validate and unwrap a store blob, decrypting the payload when needed.
pub(crate) fn retrieve(
    proc: &SecProcessor,
    require_mac: bool,
    blob: &[u8],
) -> SecResult<(StoreHeader, Zeroizing<Vec<u8>>)> {
    let header = validate(proc, require_mac, blob)?;
    let region = &blob[MAGIC_LEN + HEADER_LEN..blob.len() - MAC_LEN];

    if !header.encrypted() {
        return Ok((header, Zeroizing::new(region.to_vec())));
    }

    let aes_key = store_aes_key(proc)?;
    let cipher = AesCipher::new(&aes_key).map_err(SecError::from)?;

    let (iv, ciphertext) = region.split_at(AES_BLOCK_SIZE);
    let mut chain: [u8; AES_BLOCK_SIZE] = iv.try_into().unwrap();
    let mut plaintext = Zeroizing::new(ciphertext.to_vec());
    aes::cbc_decrypt(&cipher, &mut chain, &mut plaintext[..]).map_err(|_| SecError::Failure)?;

    let pad = *plaintext.last().ok_or(SecError::Failure)? as usize;
    if pad == 0 || pad > AES_BLOCK_SIZE || pad > plaintext.len() {
        return Err(SecError::Failure);
    }
    let body_len = plaintext.len() - pad;
    if plaintext[body_len..].iter().any(|&b| b as usize != pad) {
        return Err(SecError::Failure);
    }
    if body_len != header.data_len as usize {
        return Err(SecError::Failure);
    }
    plaintext.truncate(body_len);

    Ok((header, plaintext))
}
