// SecAPI AES Primitives
//
// Block-level AES over the RustCrypto `aes` crate with manual ECB/CBC
// chaining so cipher sessions can feed blocks incrementally, plus CTR via
// `Ctr128BE` (128-bit big-endian counter) and PKCS#7 block padding.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};

use crate::crypto::{CryptoError, CryptoResult};
use crate::types::AES_BLOCK_SIZE;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// AES block cipher keyed for 128 or 256 bits.
pub enum AesCipher {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesCipher {
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        match key.len() {
            16 => Ok(AesCipher::Aes128(
                Aes128::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            32 => Ok(AesCipher::Aes256(
                Aes256::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            n => Err(CryptoError::InvalidKeySize(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    pub fn encrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let ga = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.encrypt_block(ga),
            AesCipher::Aes256(c) => c.encrypt_block(ga),
        }
    }

    pub fn decrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let ga = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.decrypt_block(ga),
            AesCipher::Aes256(c) => c.decrypt_block(ga),
        }
    }
}

impl std::fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesCipher([REDACTED])")
    }
}

/// ECB-encrypt `data` in place. Length must be a block multiple.
pub fn ecb_encrypt(cipher: &AesCipher, data: &mut [u8]) -> CryptoResult<()> {
    check_aligned(data.len())?;
    for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        let block: &mut [u8; AES_BLOCK_SIZE] = chunk.try_into().unwrap();
        cipher.encrypt_block(block);
    }
    Ok(())
}

/// ECB-decrypt `data` in place. Length must be a block multiple.
pub fn ecb_decrypt(cipher: &AesCipher, data: &mut [u8]) -> CryptoResult<()> {
    check_aligned(data.len())?;
    for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        let block: &mut [u8; AES_BLOCK_SIZE] = chunk.try_into().unwrap();
        cipher.decrypt_block(block);
    }
    Ok(())
}

/// CBC-encrypt `data` in place, advancing `chain` so consecutive calls form
/// one continuous stream. Length must be a block multiple.
pub fn cbc_encrypt(
    cipher: &AesCipher,
    chain: &mut [u8; AES_BLOCK_SIZE],
    data: &mut [u8],
) -> CryptoResult<()> {
    check_aligned(data.len())?;
    for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        let block: &mut [u8; AES_BLOCK_SIZE] = chunk.try_into().unwrap();
        for i in 0..AES_BLOCK_SIZE {
            block[i] ^= chain[i];
        }
        cipher.encrypt_block(block);
        chain.copy_from_slice(block);
    }
    Ok(())
}

/// CBC-decrypt `data` in place, advancing `chain`.
pub fn cbc_decrypt(
    cipher: &AesCipher,
    chain: &mut [u8; AES_BLOCK_SIZE],
    data: &mut [u8],
) -> CryptoResult<()> {
    check_aligned(data.len())?;
    for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        let block: &mut [u8; AES_BLOCK_SIZE] = chunk.try_into().unwrap();
        let saved = *block;
        cipher.decrypt_block(block);
        for i in 0..AES_BLOCK_SIZE {
            block[i] ^= chain[i];
        }
        *chain = saved;
    }
    Ok(())
}

/// AES-CTR keystream state with a 128-bit network-order counter.
pub enum CtrCipher {
    Aes128(Aes128Ctr),
    Aes256(Aes256Ctr),
}

impl CtrCipher {
    pub fn new(key: &[u8], iv: &[u8; AES_BLOCK_SIZE]) -> CryptoResult<Self> {
        match key.len() {
            16 => Ok(CtrCipher::Aes128(
                Aes128Ctr::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            32 => Ok(CtrCipher::Aes256(
                Aes256Ctr::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::InvalidKeySize(e.to_string()))?,
            )),
            n => Err(CryptoError::InvalidKeySize(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// XOR the next keystream bytes into `data`.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            CtrCipher::Aes128(c) => c.apply_keystream(data),
            CtrCipher::Aes256(c) => c.apply_keystream(data),
        }
    }
}

impl std::fmt::Debug for CtrCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CtrCipher([REDACTED])")
    }
}

/// Build the final PKCS#7 block from the 0..16-byte remainder of the input.
pub fn pkcs7_pad_block(remainder: &[u8]) -> [u8; AES_BLOCK_SIZE] {
    debug_assert!(remainder.len() < AES_BLOCK_SIZE);
    let pad = (AES_BLOCK_SIZE - remainder.len()) as u8;
    let mut block = [pad; AES_BLOCK_SIZE];
    block[..remainder.len()].copy_from_slice(remainder);
    block
}

fn check_aligned(len: usize) -> CryptoResult<()> {
    if len % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidInput(format!(
            "input length {} is not a multiple of the AES block size",
            len
        )));
    }
    Ok(())
}
