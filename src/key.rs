//! Key objects: provisioning, lookup, generation, and the transient
//! plaintext materialization every crypto session goes through.
//!
//! Plaintext key bytes only ever exist inside zeroizing buffers scoped to
//! a single call. At rest a key is always the opaque store form.

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::warn;
use zeroize::Zeroizing;

use crate::codec;
use crate::crypto::random;
use crate::crypto::rsa as rsa_prim;
use crate::error::{SecError, SecResult};
use crate::ladder::{self, DerivedInputs, DERIVED_INPUTS_LEN};
use crate::processor::SecProcessor;
use crate::repository::{self, KeyRecord};
use crate::store;
use crate::types::{object_id, KeyContainer, KeyType, ObjectId, StorageLoc, AES_BLOCK_SIZE};

/// RSA material transiently loaded from a key record.
pub(crate) enum RsaKeyMaterial {
    Private(RsaPrivateKey),
    Public(RsaPublicKey),
}

impl RsaKeyMaterial {
    pub(crate) fn public_key(&self) -> RsaPublicKey {
        match self {
            RsaKeyMaterial::Private(key) => key.to_public_key(),
            RsaKeyMaterial::Public(key) => key.clone(),
        }
    }
}

/// Opaque reference to a provisioned key. The caller never sees plaintext
/// key bytes through this handle.
pub struct KeyHandle<'a> {
    proc: &'a SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: KeyRecord,
}

impl<'a> KeyHandle<'a> {
    /// Look up a key by id, validating the integrity of its store form.
    pub fn get_instance(proc: &'a SecProcessor, object_id: ObjectId) -> SecResult<KeyHandle<'a>> {
        if object_id == object_id::INVALID {
            return Err(SecError::InvalidParameters);
        }

        let (location, record) = repository::retrieve_key_record(proc, object_id)?;
        if record.info.container == KeyContainer::Store {
            store::validate(proc, false, &record.container)?;
        }

        Ok(KeyHandle {
            proc,
            object_id,
            location,
            record,
        })
    }

    /// Normalize `data` from `container` form and install it at `object_id`.
    /// Any existing object at that id is replaced.
    pub fn provision(
        proc: &SecProcessor,
        object_id: ObjectId,
        location: StorageLoc,
        container: KeyContainer,
        data: &[u8],
    ) -> SecResult<()> {
        let record = codec::process_key_container(proc, container, data, object_id)?;
        repository::store_key_record(proc, object_id, location, record)
    }

    /// Generate a fresh key of `key_type` and install it at `object_id`.
    pub fn generate(
        proc: &SecProcessor,
        object_id: ObjectId,
        key_type: KeyType,
        location: StorageLoc,
    ) -> SecResult<()> {
        if let Ok(existing) = KeyHandle::get_instance(proc, object_id) {
            if existing.location != StorageLoc::Oem {
                warn!("item has already been provisioned");
                return Err(SecError::ItemAlreadyProvisioned);
            }
        }

        match key_type {
            t if t.is_symmetric() => {
                let mut key = Zeroizing::new(vec![0u8; t.key_len()]);
                random::fill_random(&mut key);
                KeyHandle::provision(proc, object_id, location, t.clear_container(), &key)
            }
            KeyType::Rsa1024 | KeyType::Rsa2048 => {
                let private = rsa_prim::generate(key_type.key_len() * 8).map_err(SecError::from)?;
                let raw = rsa_prim::private_key_to_raw(&private).map_err(SecError::from)?;
                KeyHandle::provision(proc, object_id, location, key_type.clear_container(), &raw)
            }
            _ => Err(SecError::UnimplementedFeature),
        }
    }

    /// Remove the key from every storage tier.
    pub fn delete(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
        repository::delete_key(proc, object_id)
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn key_type(&self) -> KeyType {
        self.record.info.key_type
    }

    /// Key length in bytes; modulus size for RSA keys.
    pub fn key_len(&self) -> usize {
        self.record.info.key_type.key_len()
    }

    pub fn location(&self) -> StorageLoc {
        self.location
    }

    pub fn processor(&self) -> &'a SecProcessor {
        self.proc
    }

    /// Extract the public half of an RSA key in raw wire form.
    pub fn extract_public_key(&self) -> SecResult<rsa_prim::RawRsaPublicKey> {
        let material = self.rsa_material()?;
        rsa_prim::public_key_to_raw(&material.public_key()).map_err(SecError::from)
    }

    /// Consume the handle. The wrapped record zeroizes on drop.
    pub fn release(self) {}

    pub(crate) fn record(&self) -> &KeyRecord {
        &self.record
    }

    /// Materialize the plaintext of a symmetric key for the duration of one
    /// operation. Derived containers run through the key ladder.
    pub(crate) fn symmetric_key_bytes(&self) -> SecResult<Zeroizing<Vec<u8>>> {
        symmetric_from_record(self.proc, &self.record)
    }

    /// Load RSA material from the key record.
    pub(crate) fn rsa_material(&self) -> SecResult<RsaKeyMaterial> {
        rsa_from_record(self.proc, &self.record)
    }
}

impl std::fmt::Debug for KeyHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("object_id", &self.object_id)
            .field("key_type", &self.record.info.key_type)
            .field("location", &self.location)
            .finish()
    }
}

/// Unwrap a symmetric key from its store record.
///
/// On a secure chip the derived branch runs inside the hardware ladder and
/// the resulting key is never exposed to the host.
pub(crate) fn symmetric_from_record(
    proc: &SecProcessor,
    record: &KeyRecord,
) -> SecResult<Zeroizing<Vec<u8>>> {
    let key_type = record.info.key_type;
    if !key_type.is_symmetric() {
        warn!("not a symmetric key");
        return Err(SecError::Failure);
    }
    if record.info.container != KeyContainer::Store {
        warn!("only key store keys are supported on this platform");
        return Err(SecError::Failure);
    }

    let (header, payload) = store::retrieve(proc, false, &record.container)?;

    if header.inner_container_type == KeyContainer::Derived.wire_id() {
        if payload.len() != DERIVED_INPUTS_LEN {
            warn!("invalid key length in the store");
            return Err(SecError::Failure);
        }
        if key_type.key_len() != AES_BLOCK_SIZE {
            warn!("derived key can only be the size of the AES block");
            return Err(SecError::Failure);
        }
        let inputs = DerivedInputs::from_bytes(&payload)?;
        let key = ladder::derive(&proc.root_key(), &inputs)?;
        Ok(Zeroizing::new(key.to_vec()))
    } else {
        if payload.len() != key_type.key_len() {
            warn!("invalid key length in the store");
            return Err(SecError::Failure);
        }
        Ok(payload)
    }
}

/// Load RSA material from a store record. The raw struct lives only inside
/// this call; the parsed key is handed to the caller for one operation.
pub(crate) fn rsa_from_record(
    proc: &SecProcessor,
    record: &KeyRecord,
) -> SecResult<RsaKeyMaterial> {
    let key_type = record.info.key_type;
    if !key_type.is_rsa() {
        warn!("not an RSA key");
        return Err(SecError::Failure);
    }
    if record.info.container != KeyContainer::Store {
        warn!("only key store keys are supported on this platform");
        return Err(SecError::Failure);
    }

    let (_, payload) = store::retrieve(proc, false, &record.container)?;

    let material = match key_type {
        KeyType::Rsa1024 | KeyType::Rsa2048 => {
            let key = rsa_prim::private_key_from_raw(&payload).map_err(SecError::from)?;
            RsaKeyMaterial::Private(key)
        }
        KeyType::Rsa1024Public | KeyType::Rsa2048Public => {
            let raw = rsa_prim::RawRsaPublicKey::from_bytes(&payload).map_err(SecError::from)?;
            let key = rsa_prim::public_key_from_raw(&raw).map_err(SecError::from)?;
            RsaKeyMaterial::Public(key)
        }
        _ => return Err(SecError::Failure),
    };

    let size = match &material {
        RsaKeyMaterial::Private(key) => key.size(),
        RsaKeyMaterial::Public(key) => key.size(),
    };
    if size != key_type.key_len() {
        warn!("RSA key size does not match the declared key type");
        return Err(SecError::Failure);
    }

    Ok(material)
}
