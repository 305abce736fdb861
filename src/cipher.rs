//! Cipher sessions over opaque key references.
//!
//! Symmetric key material is materialized exactly once at session creation
//! (through the ladder path for derived containers) and installed into the
//! algorithm state; the stack copy is zeroized before `new` returns. RSA
//! material is loaded per `process` call and dropped immediately after.

use subtle::ConstantTimeEq;
use tracing::warn;

use crate::crypto::aes::{self, AesCipher, CtrCipher};
use crate::crypto::rsa as rsa_prim;
use crate::error::{SecError, SecResult};
use crate::key::{KeyHandle, RsaKeyMaterial};
use crate::processor::SecProcessor;
use crate::repository::KeyRecord;
use crate::types::{CipherAlgorithm, CipherMode, KeyType, AES_BLOCK_SIZE};

enum CipherState {
    AesEcb {
        cipher: AesCipher,
    },
    AesCbc {
        cipher: AesCipher,
        chain: [u8; AES_BLOCK_SIZE],
    },
    AesCtr {
        cipher: CtrCipher,
    },
    Rsa {
        record: KeyRecord,
    },
}

/// A cipher session. `process` with `last = true` terminates it; further
/// processing calls fail deterministically.
pub struct CipherHandle<'a> {
    proc: &'a SecProcessor,
    algorithm: CipherAlgorithm,
    mode: CipherMode,
    key_len: usize,
    state: CipherState,
    last: bool,
}

fn validate_key(
    key_type: KeyType,
    algorithm: CipherAlgorithm,
    mode: CipherMode,
    iv: Option<&[u8]>,
) -> SecResult<()> {
    if algorithm.is_aes() {
        if !key_type.is_aes() {
            warn!("invalid key used for specified algorithm");
            return Err(SecError::InvalidParameters);
        }
        match algorithm {
            CipherAlgorithm::AesEcbNoPadding | CipherAlgorithm::AesEcbPkcs7 => {
                if iv.is_some() {
                    return Err(SecError::InvalidParameters);
                }
            }
            _ => match iv {
                Some(iv) if iv.len() == AES_BLOCK_SIZE => {}
                _ => return Err(SecError::InvalidParameters),
            },
        }
        return Ok(());
    }

    // RSA algorithms
    if !key_type.is_rsa() {
        warn!("invalid key used for specified algorithm");
        return Err(SecError::InvalidParameters);
    }
    if !mode.is_encrypt() && !key_type.is_private() {
        warn!("RSA decryption requires a private key");
        return Err(SecError::InvalidParameters);
    }
    if iv.is_some() {
        return Err(SecError::InvalidParameters);
    }
    Ok(())
}

impl<'a> CipherHandle<'a> {
    /// Open a cipher session over `key`.
    pub fn new(
        key: &KeyHandle<'a>,
        algorithm: CipherAlgorithm,
        mode: CipherMode,
        iv: Option<&[u8]>,
    ) -> SecResult<CipherHandle<'a>> {
        validate_key(key.key_type(), algorithm, mode, iv)?;

        let state = match algorithm {
            CipherAlgorithm::AesEcbNoPadding | CipherAlgorithm::AesEcbPkcs7 => {
                let sym = key.symmetric_key_bytes()?;
                CipherState::AesEcb {
                    cipher: AesCipher::new(&sym).map_err(SecError::from)?,
                }
            }
            CipherAlgorithm::AesCbcNoPadding | CipherAlgorithm::AesCbcPkcs7 => {
                let sym = key.symmetric_key_bytes()?;
                let mut chain = [0u8; AES_BLOCK_SIZE];
                chain.copy_from_slice(iv.unwrap());
                CipherState::AesCbc {
                    cipher: AesCipher::new(&sym).map_err(SecError::from)?,
                    chain,
                }
            }
            CipherAlgorithm::AesCtr => {
                let sym = key.symmetric_key_bytes()?;
                let iv: [u8; AES_BLOCK_SIZE] = iv.unwrap().try_into().unwrap();
                CipherState::AesCtr {
                    cipher: CtrCipher::new(&sym, &iv).map_err(SecError::from)?,
                }
            }
            CipherAlgorithm::RsaPkcs1 | CipherAlgorithm::RsaOaep => CipherState::Rsa {
                record: key.record().clone(),
            },
        };

        Ok(CipherHandle {
            proc: key.processor(),
            algorithm,
            mode,
            key_len: key.key_len(),
            state,
            last: false,
        })
    }

    /// Output size `process` needs for `input_len` bytes.
    pub fn required_output_size(&self, input_len: usize, last: bool) -> SecResult<usize> {
        match self.algorithm {
            CipherAlgorithm::AesEcbNoPadding | CipherAlgorithm::AesCbcNoPadding => {
                if input_len % AES_BLOCK_SIZE != 0 {
                    return Err(SecError::InvalidInputSize);
                }
                Ok(input_len)
            }
            CipherAlgorithm::AesEcbPkcs7 | CipherAlgorithm::AesCbcPkcs7 => {
                if self.mode.is_encrypt() {
                    if !last {
                        if input_len % AES_BLOCK_SIZE != 0 {
                            return Err(SecError::InvalidInputSize);
                        }
                        Ok(input_len)
                    } else {
                        Ok(input_len / AES_BLOCK_SIZE * AES_BLOCK_SIZE + AES_BLOCK_SIZE)
                    }
                } else {
                    if input_len % AES_BLOCK_SIZE != 0 {
                        return Err(SecError::InvalidInputSize);
                    }
                    Ok(input_len)
                }
            }
            CipherAlgorithm::AesCtr => Ok(input_len),
            CipherAlgorithm::RsaPkcs1 | CipherAlgorithm::RsaOaep => Ok(self.key_len),
        }
    }

    /// Process one span of data. `output = None` queries the required
    /// output size without consuming the session.
    pub fn process(
        &mut self,
        input: &[u8],
        last: bool,
        output: Option<&mut [u8]>,
    ) -> SecResult<usize> {
        if self.last {
            warn!("last block has already been processed");
            return Err(SecError::Failure);
        }

        let required = self.required_output_size(input.len(), last)?;
        let output = match output {
            None => return Ok(required),
            Some(out) => {
                if out.len() < required {
                    warn!("output buffer is too small");
                    return Err(SecError::InvalidInputSize);
                }
                out
            }
        };
        self.last = last;

        match self.algorithm {
            CipherAlgorithm::AesEcbNoPadding
            | CipherAlgorithm::AesCbcNoPadding
            | CipherAlgorithm::AesCtr => {
                output[..input.len()].copy_from_slice(input);
                self.transform(&mut output[..input.len()])?;
                Ok(input.len())
            }

            CipherAlgorithm::AesEcbPkcs7 | CipherAlgorithm::AesCbcPkcs7 => {
                if self.mode.is_encrypt() {
                    let full = input.len() / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
                    output[..full].copy_from_slice(&input[..full]);
                    self.transform(&mut output[..full])?;
                    let mut written = full;
                    if last {
                        let mut block = aes::pkcs7_pad_block(&input[full..]);
                        self.transform(&mut block)?;
                        output[full..full + AES_BLOCK_SIZE].copy_from_slice(&block);
                        written += AES_BLOCK_SIZE;
                    }
                    Ok(written)
                } else {
                    output[..input.len()].copy_from_slice(input);
                    self.transform(&mut output[..input.len()])?;
                    let mut written = input.len();
                    if last && written >= AES_BLOCK_SIZE {
                        written = strip_pkcs7(&output[..written])?;
                    }
                    Ok(written)
                }
            }

            CipherAlgorithm::RsaPkcs1 | CipherAlgorithm::RsaOaep => {
                let oaep = self.algorithm == CipherAlgorithm::RsaOaep;
                let record = match &self.state {
                    CipherState::Rsa { record } => record,
                    _ => unreachable!(),
                };
                let material = crate::key::rsa_from_record(self.proc, record)?;

                if self.mode.is_encrypt() {
                    let overhead = if oaep { 42 } else { 11 };
                    if input.len() + overhead > self.key_len {
                        return Err(SecError::InvalidInputSize);
                    }
                    let ciphertext = rsa_prim::public_encrypt(&material.public_key(), oaep, input)
                        .map_err(SecError::from)?;
                    output[..ciphertext.len()].copy_from_slice(&ciphertext);
                    Ok(ciphertext.len())
                } else {
                    if input.len() != self.key_len {
                        return Err(SecError::InvalidInputSize);
                    }
                    let private = match &material {
                        RsaKeyMaterial::Private(key) => key,
                        RsaKeyMaterial::Public(_) => return Err(SecError::Failure),
                    };
                    let plaintext = rsa_prim::private_decrypt(private, oaep, input)
                        .map_err(|_| SecError::Failure)?;
                    output[..plaintext.len()].copy_from_slice(&plaintext);
                    Ok(plaintext.len())
                }
            }
        }
    }

    /// Process a fragmented (subsample) buffer: every `fragment_period`
    /// bytes, the `fragment_size` bytes at `fragment_offset` run through the
    /// cipher in place; the rest passes through untouched. Only the
    /// stream-shaped algorithms support this.
    pub fn process_fragmented(
        &mut self,
        input: &[u8],
        last: bool,
        output: Option<&mut [u8]>,
        fragment_offset: usize,
        fragment_size: usize,
        fragment_period: usize,
    ) -> SecResult<usize> {
        if self.last {
            warn!("last block has already been processed");
            return Err(SecError::Failure);
        }

        match self.algorithm {
            CipherAlgorithm::AesEcbNoPadding
            | CipherAlgorithm::AesCbcNoPadding
            | CipherAlgorithm::AesCtr => {}
            CipherAlgorithm::AesEcbPkcs7 | CipherAlgorithm::AesCbcPkcs7 => {
                return Err(SecError::InvalidParameters);
            }
            _ => return Err(SecError::UnimplementedFeature),
        }

        if fragment_period == 0
            || fragment_offset + fragment_size > fragment_period
            || input.len() % fragment_period != 0
        {
            return Err(SecError::InvalidInputSize);
        }
        if self.algorithm != CipherAlgorithm::AesCtr && fragment_size % AES_BLOCK_SIZE != 0 {
            return Err(SecError::InvalidInputSize);
        }

        let output = match output {
            None => return Ok(input.len()),
            Some(out) => {
                if out.len() < input.len() {
                    warn!("output buffer is too small");
                    return Err(SecError::InvalidInputSize);
                }
                out
            }
        };
        self.last = last;

        output[..input.len()].copy_from_slice(input);
        let mut start = 0;
        while start < input.len() {
            let fragment = &mut output[start + fragment_offset..start + fragment_offset + fragment_size];
            self.transform(fragment)?;
            start += fragment_period;
        }

        Ok(input.len())
    }

    /// Consume the session. Algorithm state zeroizes on drop.
    pub fn release(self) {}

    fn transform(&mut self, data: &mut [u8]) -> SecResult<()> {
        let encrypt = self.mode.is_encrypt();
        match &mut self.state {
            CipherState::AesEcb { cipher } => {
                if encrypt {
                    aes::ecb_encrypt(cipher, data).map_err(SecError::from)
                } else {
                    aes::ecb_decrypt(cipher, data).map_err(SecError::from)
                }
            }
            CipherState::AesCbc { cipher, chain } => {
                if encrypt {
                    aes::cbc_encrypt(cipher, chain, data).map_err(SecError::from)
                } else {
                    aes::cbc_decrypt(cipher, chain, data).map_err(SecError::from)
                }
            }
            CipherState::AesCtr { cipher } => {
                cipher.apply_keystream(data);
                Ok(())
            }
            CipherState::Rsa { .. } => Err(SecError::Failure),
        }
    }
}

/// Validate the final PKCS#7 block and return the unpadded length.
fn strip_pkcs7(data: &[u8]) -> SecResult<usize> {
    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > AES_BLOCK_SIZE {
        warn!("invalid pad value encountered");
        return Err(SecError::InvalidPadding);
    }
    let expected = vec![pad as u8; pad];
    if !bool::from(expected.ct_eq(&data[data.len() - pad..])) {
        warn!("invalid pad value encountered");
        return Err(SecError::InvalidPadding);
    }
    Ok(data.len() - pad)
}

impl std::fmt::Debug for CipherHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherHandle")
            .field("algorithm", &self.algorithm)
            .field("mode", &self.mode)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
