// Cipher session tests: round trips for every algorithm and mode,
// fragmented processing, last-flag latching, and padding robustness.

mod common;

use secapi::prelude::*;
use tempfile::TempDir;

const KEY_ID: ObjectId = 1000;
const RSA_ID: ObjectId = 1100;

fn provision_aes128(proc: &SecProcessor) -> [u8; 16] {
    let key_bytes: [u8; 16] = core::array::from_fn(|i| i as u8);
    KeyHandle::provision(
        proc,
        KEY_ID,
        StorageLoc::Ram,
        KeyContainer::RawAes128,
        &key_bytes,
    )
    .unwrap();
    key_bytes
}

fn provision_aes256(proc: &SecProcessor) -> [u8; 32] {
    let key_bytes: [u8; 32] = core::array::from_fn(|i| i as u8);
    KeyHandle::provision(
        proc,
        KEY_ID,
        StorageLoc::Ram,
        KeyContainer::RawAes256,
        &key_bytes,
    )
    .unwrap();
    key_bytes
}

fn roundtrip(
    proc: &SecProcessor,
    algorithm: CipherAlgorithm,
    iv: Option<&[u8]>,
    plaintext: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let key = KeyHandle::get_instance(proc, KEY_ID).unwrap();

    let mut enc = CipherHandle::new(&key, algorithm, CipherMode::Encrypt, iv).unwrap();
    let required = enc.process(plaintext, true, None).unwrap();
    let mut ciphertext = vec![0u8; required];
    let written = enc.process(plaintext, true, Some(&mut ciphertext)).unwrap();
    ciphertext.truncate(written);

    let mut dec = CipherHandle::new(&key, algorithm, CipherMode::Decrypt, iv).unwrap();
    let mut decrypted = vec![0u8; ciphertext.len()];
    let written = dec
        .process(&ciphertext, true, Some(&mut decrypted))
        .unwrap();
    decrypted.truncate(written);

    (ciphertext, decrypted)
}

#[test]
fn test_aes_cbc_pkcs7_seed_vector() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);

    let iv: [u8; 16] = core::array::from_fn(|i| i as u8);
    let (ciphertext, decrypted) = roundtrip(
        &proc,
        CipherAlgorithm::AesCbcPkcs7,
        Some(&iv),
        b"test",
    );

    assert_eq!(ciphertext.len(), 16);
    assert_eq!(decrypted, b"test");
}

#[test]
fn test_symmetric_roundtrips_aes128() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);

    let iv = [0x42u8; 16];
    let aligned = vec![0xabu8; 64];
    let ragged = vec![0xcdu8; 37];

    for algorithm in [
        CipherAlgorithm::AesEcbNoPadding,
        CipherAlgorithm::AesCbcNoPadding,
    ] {
        let iv_opt = (algorithm == CipherAlgorithm::AesCbcNoPadding).then_some(&iv[..]);
        let (ciphertext, decrypted) = roundtrip(&proc, algorithm, iv_opt, &aligned);
        assert_eq!(ciphertext.len(), aligned.len());
        assert_eq!(decrypted, aligned);
        assert_ne!(ciphertext, aligned);
    }

    for algorithm in [CipherAlgorithm::AesEcbPkcs7, CipherAlgorithm::AesCbcPkcs7] {
        let iv_opt = (algorithm == CipherAlgorithm::AesCbcPkcs7).then_some(&iv[..]);

        let (ciphertext, decrypted) = roundtrip(&proc, algorithm, iv_opt, &ragged);
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(decrypted, ragged);

        // aligned input still gains a full padding block
        let (ciphertext, decrypted) = roundtrip(&proc, algorithm, iv_opt, &aligned);
        assert_eq!(ciphertext.len(), aligned.len() + 16);
        assert_eq!(decrypted, aligned);
    }

    let (ciphertext, decrypted) = roundtrip(&proc, CipherAlgorithm::AesCtr, Some(&iv), &ragged);
    assert_eq!(ciphertext.len(), ragged.len());
    assert_eq!(decrypted, ragged);
}

#[test]
fn test_symmetric_roundtrips_aes256() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes256(&proc);

    let iv = [0x17u8; 16];
    let message = vec![0x5eu8; 80];

    for (algorithm, iv_opt) in [
        (CipherAlgorithm::AesEcbPkcs7, None),
        (CipherAlgorithm::AesCbcPkcs7, Some(&iv[..])),
        (CipherAlgorithm::AesCtr, Some(&iv[..])),
    ] {
        let (_, decrypted) = roundtrip(&proc, algorithm, iv_opt, &message);
        assert_eq!(decrypted, message);
    }
}

#[test]
fn test_multi_call_session_matches_one_shot() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let iv = [0x99u8; 16];
    let message = vec![0x3cu8; 96];

    let mut oneshot = CipherHandle::new(
        &key,
        CipherAlgorithm::AesCbcNoPadding,
        CipherMode::Encrypt,
        Some(&iv),
    )
    .unwrap();
    let mut expected = vec![0u8; 96];
    oneshot.process(&message, true, Some(&mut expected)).unwrap();

    let mut chunked = CipherHandle::new(
        &key,
        CipherAlgorithm::AesCbcNoPadding,
        CipherMode::Encrypt,
        Some(&iv),
    )
    .unwrap();
    let mut out = vec![0u8; 96];
    let first = chunked.process(&message[..32], false, Some(&mut out[..32])).unwrap();
    assert_eq!(first, 32);
    chunked.process(&message[32..], true, Some(&mut out[32..])).unwrap();

    assert_eq!(out, expected);
}

#[test]
fn test_last_flag_latches() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let mut cipher = CipherHandle::new(
        &key,
        CipherAlgorithm::AesEcbNoPadding,
        CipherMode::Encrypt,
        None,
    )
    .unwrap();

    // a size query does not consume the session
    cipher.process(&[0u8; 16], true, None).unwrap();

    let mut out = [0u8; 16];
    cipher.process(&[0u8; 16], true, Some(&mut out)).unwrap();
    assert_eq!(
        cipher.process(&[0u8; 16], true, Some(&mut out)).err(),
        Some(SecError::Failure)
    );
}

#[test]
fn test_output_size_contract() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let mut cipher = CipherHandle::new(
        &key,
        CipherAlgorithm::AesEcbPkcs7,
        CipherMode::Encrypt,
        None,
    )
    .unwrap();

    // aligned input on the last call still needs the extra block
    assert_eq!(cipher.process(&[0u8; 32], true, None).unwrap(), 48);

    let mut short = [0u8; 32];
    assert_eq!(
        cipher.process(&[0u8; 32], true, Some(&mut short)).err(),
        Some(SecError::InvalidInputSize)
    );

    // misaligned input in a no-padding session
    let mut nopad = CipherHandle::new(
        &key,
        CipherAlgorithm::AesEcbNoPadding,
        CipherMode::Encrypt,
        None,
    )
    .unwrap();
    let mut out = [0u8; 32];
    assert_eq!(
        nopad.process(&[0u8; 17], true, Some(&mut out)).err(),
        Some(SecError::InvalidInputSize)
    );
}

#[test]
fn test_pkcs7_padding_tamper_matrix() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    let key_bytes = provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    // craft final plaintext blocks with broken padding, encrypt them with
    // the raw block cipher, and feed them to a PKCS#7 decrypt session
    for bad_block in [
        [0x00u8; 16],                                 // pad value 0
        [0x11u8; 16],                                 // pad value 17
        {
            let mut b = [0x02u8; 16];
            b[14] = 0x01; // inconsistent trailing bytes
            b
        },
    ] {
        let ciphertext = common::aes128_encrypt_block(&key_bytes, &bad_block);
        let mut dec = CipherHandle::new(
            &key,
            CipherAlgorithm::AesEcbPkcs7,
            CipherMode::Decrypt,
            None,
        )
        .unwrap();
        let mut out = [0u8; 16];
        assert_eq!(
            dec.process(&ciphertext, true, Some(&mut out)).err(),
            Some(SecError::InvalidPadding)
        );
    }
}

#[test]
fn test_fragmented_matches_one_shot() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let iv = [0x31u8; 16];
    let message = vec![0x77u8; 96];

    for algorithm in [CipherAlgorithm::AesCbcNoPadding, CipherAlgorithm::AesCtr] {
        let mut oneshot =
            CipherHandle::new(&key, algorithm, CipherMode::Encrypt, Some(&iv)).unwrap();
        let mut expected = vec![0u8; 96];
        oneshot.process(&message, true, Some(&mut expected)).unwrap();

        let mut fragmented =
            CipherHandle::new(&key, algorithm, CipherMode::Encrypt, Some(&iv)).unwrap();
        let mut out = vec![0u8; 96];
        let written = fragmented
            .process_fragmented(&message, true, Some(&mut out), 0, 32, 32)
            .unwrap();
        assert_eq!(written, 96);
        assert_eq!(out, expected);
    }
}

#[test]
fn test_fragmented_subsample_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let iv = [0x08u8; 16];
    let message: Vec<u8> = (0u8..96).collect();

    // encrypt 16 bytes at offset 16 of every 48-byte period
    let mut enc =
        CipherHandle::new(&key, CipherAlgorithm::AesCtr, CipherMode::Encrypt, Some(&iv)).unwrap();
    let mut protected = vec![0u8; 96];
    enc.process_fragmented(&message, true, Some(&mut protected), 16, 16, 48)
        .unwrap();

    // clear regions pass through untouched
    assert_eq!(&protected[..16], &message[..16]);
    assert_eq!(&protected[32..64], &message[32..64]);
    assert_ne!(&protected[16..32], &message[16..32]);

    let mut dec =
        CipherHandle::new(&key, CipherAlgorithm::AesCtr, CipherMode::Decrypt, Some(&iv)).unwrap();
    let mut recovered = vec![0u8; 96];
    dec.process_fragmented(&protected, true, Some(&mut recovered), 16, 16, 48)
        .unwrap();
    assert_eq!(recovered, message);
}

#[test]
fn test_fragmented_parameter_validation() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    let mut cipher =
        CipherHandle::new(&key, CipherAlgorithm::AesCtr, CipherMode::Encrypt, Some(&[0u8; 16]))
            .unwrap();
    let mut out = [0u8; 96];

    // fragment spills past the period
    assert_eq!(
        cipher
            .process_fragmented(&[0u8; 96], true, Some(&mut out), 40, 16, 48)
            .err(),
        Some(SecError::InvalidInputSize)
    );
    // input is not a whole number of periods
    assert_eq!(
        cipher
            .process_fragmented(&[0u8; 50], true, Some(&mut out), 0, 16, 48)
            .err(),
        Some(SecError::InvalidInputSize)
    );

    let mut padded = CipherHandle::new(
        &key,
        CipherAlgorithm::AesCbcPkcs7,
        CipherMode::Encrypt,
        Some(&[0u8; 16]),
    )
    .unwrap();
    assert_eq!(
        padded
            .process_fragmented(&[0u8; 96], true, Some(&mut out), 0, 48, 48)
            .err(),
        Some(SecError::InvalidParameters)
    );
}

#[test]
fn test_rsa_cipher_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);

    KeyHandle::generate(&proc, RSA_ID, KeyType::Rsa1024, StorageLoc::Ram).unwrap();
    let key = KeyHandle::get_instance(&proc, RSA_ID).unwrap();

    for algorithm in [CipherAlgorithm::RsaPkcs1, CipherAlgorithm::RsaOaep] {
        let mut enc = CipherHandle::new(&key, algorithm, CipherMode::Encrypt, None).unwrap();
        assert_eq!(enc.process(b"secret", true, None).unwrap(), 128);
        let mut ciphertext = [0u8; 128];
        let written = enc.process(b"secret", true, Some(&mut ciphertext)).unwrap();
        assert_eq!(written, 128);

        let mut dec = CipherHandle::new(&key, algorithm, CipherMode::Decrypt, None).unwrap();
        let mut plaintext = [0u8; 128];
        let written = dec
            .process(&ciphertext, true, Some(&mut plaintext))
            .unwrap();
        assert_eq!(&plaintext[..written], b"secret");
    }
}

#[test]
fn test_rsa_input_size_limits() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);

    KeyHandle::generate(&proc, RSA_ID, KeyType::Rsa1024, StorageLoc::Ram).unwrap();
    let key = KeyHandle::get_instance(&proc, RSA_ID).unwrap();

    // PKCS#1 v1.5 admits at most modulus - 11 bytes
    let mut enc = CipherHandle::new(&key, CipherAlgorithm::RsaPkcs1, CipherMode::Encrypt, None)
        .unwrap();
    let mut out = [0u8; 128];
    assert_eq!(
        enc.process(&[0u8; 118], true, Some(&mut out)).err(),
        Some(SecError::InvalidInputSize)
    );

    // decryption input must be exactly the modulus size
    let mut dec = CipherHandle::new(&key, CipherAlgorithm::RsaPkcs1, CipherMode::Decrypt, None)
        .unwrap();
    assert_eq!(
        dec.process(&[0u8; 64], true, Some(&mut out)).err(),
        Some(SecError::InvalidInputSize)
    );
}

#[test]
fn test_rsa_public_key_cannot_open_decrypt_session() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);

    KeyHandle::generate(&proc, RSA_ID, KeyType::Rsa1024, StorageLoc::Ram).unwrap();
    let public = KeyHandle::get_instance(&proc, RSA_ID)
        .unwrap()
        .extract_public_key()
        .unwrap();
    KeyHandle::provision(
        &proc,
        RSA_ID + 1,
        StorageLoc::Ram,
        KeyContainer::RawRsa1024Public,
        &public.to_bytes(),
    )
    .unwrap();

    let public_key = KeyHandle::get_instance(&proc, RSA_ID + 1).unwrap();
    assert_eq!(
        CipherHandle::new(&public_key, CipherAlgorithm::RsaPkcs1, CipherMode::Decrypt, None).err(),
        Some(SecError::InvalidParameters)
    );
}

#[test]
fn test_hmac_key_rejected_for_aes_cipher() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);

    KeyHandle::provision(
        &proc,
        KEY_ID,
        StorageLoc::Ram,
        KeyContainer::RawHmac128,
        &[0u8; 16],
    )
    .unwrap();
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();
    assert_eq!(
        CipherHandle::new(&key, CipherAlgorithm::AesEcbNoPadding, CipherMode::Encrypt, None).err(),
        Some(SecError::InvalidParameters)
    );
}

#[test]
fn test_key_ladder_derivation_determinism() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);

    let input1 = [0x11u8; 16];
    let input2 = [0x22u8; 16];
    secapi::derive::derive_key_ladder_aes128(
        &proc,
        KEY_ID,
        StorageLoc::Ram,
        KeyLadderRoot::Unique,
        Some(&input1),
        Some(&input2),
        None,
        None,
    )
    .unwrap();

    // symmetric keys expose no public half
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();
    assert!(key.extract_public_key().is_err());

    // the materialized key equals the two-stage ladder over the fake root
    let expected_key = common::ladder(&common::ROOT_KEY, &input1, &input2);
    let fingerprint = common::zero_block_fingerprint(&proc, KEY_ID);
    assert_eq!(
        fingerprint,
        common::aes128_encrypt_block(&expected_key, &[0u8; 16])
    );
}

#[test]
fn test_cipher_errors_on_cbc_without_iv() {
    let tmp = TempDir::new().unwrap();
    let proc = common::processor(&tmp);
    provision_aes128(&proc);
    let key = KeyHandle::get_instance(&proc, KEY_ID).unwrap();

    assert_eq!(
        CipherHandle::new(&key, CipherAlgorithm::AesCbcNoPadding, CipherMode::Encrypt, None).err(),
        Some(SecError::InvalidParameters)
    );
    assert_eq!(
        CipherHandle::new(
            &key,
            CipherAlgorithm::AesEcbNoPadding,
            CipherMode::Encrypt,
            Some(&[0u8; 16])
        )
        .err(),
        Some(SecError::InvalidParameters)
    );
}
