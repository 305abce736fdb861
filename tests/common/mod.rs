// Shared helpers for the integration suite: temp-dir processors, a minimal
// DER builder for self-signed RSA certificates, and an independent
// reimplementation of the base-key ladder used to cross-check derivations.

#![allow(dead_code)]

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tempfile::TempDir;

use secapi::prelude::*;

/// The fake device root key every reference processor carries.
pub const ROOT_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
];

/// Create a processor storing everything under `tmp`.
pub fn processor(tmp: &TempDir) -> SecProcessor {
    SecProcessor::new(ProcessorInitParams {
        keystorage_dir: Some(tmp.path().join("keys")),
        certstorage_dir: Some(tmp.path().join("certs")),
        bundlestorage_dir: Some(tmp.path().join("bundles")),
        custom_container: None,
    })
    .unwrap()
}

pub fn aes128_encrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// Two-stage ladder: `AES(AES(input1; root); input2)`.
pub fn ladder(root: &[u8; 16], input1: &[u8; 16], input2: &[u8; 16]) -> [u8; 16] {
    let stage1 = aes128_encrypt_block(root, input1);
    aes128_encrypt_block(&stage1, input2)
}

/// Independent recomputation of the base key for `nonce`, mirroring the
/// documented recipe from the raw primitives.
pub fn expected_base_key(nonce: &[u8; 20]) -> [u8; 16] {
    let mut key = ROOT_KEY;
    for i in 1u32..=4 {
        let mut hasher = Sha1::new();
        hasher.update(i.to_be_bytes());
        hasher.update(b"sivSha1");
        hasher.update(b"aesEcbNone");
        hasher.update(nonce);
        let digest = hasher.finalize();
        let mut c = [0u8; 16];
        c.copy_from_slice(&digest[..16]);
        key = aes128_encrypt_block(&key, &c);
    }
    key
}

/// Encrypt one zero block under the key stored at `object_id`, used to
/// observe derived key material without any export surface.
pub fn zero_block_fingerprint(proc: &SecProcessor, object_id: ObjectId) -> [u8; 16] {
    let key = KeyHandle::get_instance(proc, object_id).unwrap();
    let mut cipher = CipherHandle::new(
        &key,
        CipherAlgorithm::AesEcbNoPadding,
        CipherMode::Encrypt,
        None,
    )
    .unwrap();
    let mut out = [0u8; 16];
    cipher.process(&[0u8; 16], true, Some(&mut out)).unwrap();
    out
}

// ---------------------------------------------------------------------------
// Minimal DER builder, enough for a self-signed RSA certificate
// ---------------------------------------------------------------------------

fn der_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, (len & 0xFF) as u8]
    }
}

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&der_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn der_seq(parts: &[&[u8]]) -> Vec<u8> {
    der(0x30, &parts.concat())
}

fn der_integer(value: &[u8]) -> Vec<u8> {
    let mut bytes: Vec<u8> = value.iter().copied().skip_while(|&b| b == 0).collect();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    der(0x02, &bytes)
}

fn der_bit_string(value: &[u8]) -> Vec<u8> {
    let mut content = vec![0u8];
    content.extend_from_slice(value);
    der(0x03, &content)
}

// sha256WithRSAEncryption
const OID_SHA256_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
// rsaEncryption
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
// id-at-commonName
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

fn alg_identifier(oid: &[u8]) -> Vec<u8> {
    der_seq(&[&der(0x06, oid), &der(0x05, &[])])
}

fn name(common_name: &str) -> Vec<u8> {
    let attr = der_seq(&[&der(0x06, OID_COMMON_NAME), &der(0x0C, common_name.as_bytes())]);
    der_seq(&[&der(0x31, &attr)])
}

fn validity() -> Vec<u8> {
    der_seq(&[
        &der(0x17, b"200101000000Z"),
        &der(0x17, b"400101000000Z"),
    ])
}

/// Build a self-signed v1 certificate (sha256WithRSAEncryption) for `key`.
pub fn self_signed_cert(key: &RsaPrivateKey, common_name: &str) -> Vec<u8> {
    let spki_alg = alg_identifier(OID_RSA_ENCRYPTION);
    let pkcs1 = key.to_public_key().to_pkcs1_der().unwrap();
    let spki = der_seq(&[&spki_alg, &der_bit_string(pkcs1.as_bytes())]);

    let tbs = der_seq(&[
        &der_integer(&[1]),
        &alg_identifier(OID_SHA256_RSA),
        &name(common_name),
        &validity(),
        &name(common_name),
        &spki,
    ]);

    let digest = Sha256::digest(&tbs);
    let signature = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();

    der_seq(&[&tbs, &alg_identifier(OID_SHA256_RSA), &der_bit_string(&signature)])
}

/// PEM-armor a DER certificate.
pub fn pem_armor(der: &[u8]) -> Vec<u8> {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut base64 = String::new();
    for chunk in der.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let idx = [
            b[0] >> 2,
            ((b[0] & 0x03) << 4) | (b[1] >> 4),
            ((b[1] & 0x0F) << 2) | (b[2] >> 6),
            b[2] & 0x3F,
        ];
        for (i, &x) in idx.iter().enumerate() {
            if i > chunk.len() {
                base64.push('=');
            } else {
                base64.push(TABLE[x as usize] as char);
            }
        }
    }

    let mut out = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in base64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).unwrap());
        out.push('\n');
    }
    out.push_str("-----END CERTIFICATE-----\n");
    out.into_bytes()
}
