//! Processor handle: root of every SecAPI object graph.
//!
//! A processor owns the storage directories, the RAM object tables, the
//! constant device id, and the device root key. On real hardware the root
//! key never leaves the key ladder engine; this reference build fakes it
//! with a well-known constant so the rest of the stack can exercise the
//! same contracts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use zeroize::Zeroize;

use crate::derive;
use crate::error::{SecError, SecResult};
use crate::key::KeyHandle;
use crate::ladder;
use crate::repository::{KeyRecord, ObjectStore};
use crate::store;
use crate::types::{
    object_id, DigestAlgorithm, KeyContainer, KeyLadderRoot, KeyType, ObjectId, StorageLoc,
    AES_BLOCK_SIZE, DEVICE_ID_LEN, MAX_FILE_PATH_LEN,
};

/// Default storage directories.
pub const KEYSTORAGE_DEFAULT_DIR: &str = "./secapi/keys";
pub const CERTSTORAGE_DEFAULT_DIR: &str = "./secapi/certs";
pub const BUNDLESTORAGE_DEFAULT_DIR: &str = "./secapi/bundles";

/// Domain separation for the store-AES ladder inputs.
const STORE_AES_LADDER_INPUT: &[u8] = b"secapiStoreAes";
/// Domain separation for the store-MAC ladder inputs.
const STORE_MAC_LADDER_INPUT: &[u8] = b"secapiStoreMacKeyGen";

/// Fixed nonce used to derive the certificate-store MAC key at boot.
const CERTSTORE_NONCE: &[u8; 20] = b"abcdefghijklmnopqr\0\0";
/// Fixed other-info for the certificate-store Concat-KDF derivation.
const CERTSTORE_OTHER_INFO: &[u8] = b"certMacKeyhmacSha256concatKdfSha1";

/// Handler for vendor extension key containers, injected at processor
/// creation. Returns the container/data pair the blob normalizes to.
pub trait CustomKeyContainer: Send + Sync {
    fn process(
        &self,
        extension_id: u32,
        data: &[u8],
        object_id: ObjectId,
    ) -> SecResult<(KeyContainer, Vec<u8>)>;
}

/// Parameters for [`SecProcessor::new`]. `None` fields fall back to the
/// default directories.
#[derive(Default)]
pub struct ProcessorInitParams {
    pub keystorage_dir: Option<PathBuf>,
    pub certstorage_dir: Option<PathBuf>,
    pub bundlestorage_dir: Option<PathBuf>,
    pub custom_container: Option<Box<dyn CustomKeyContainer>>,
}

impl fmt::Debug for ProcessorInitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorInitParams")
            .field("keystorage_dir", &self.keystorage_dir)
            .field("certstorage_dir", &self.certstorage_dir)
            .field("bundlestorage_dir", &self.bundlestorage_dir)
            .field("custom_container", &self.custom_container.is_some())
            .finish()
    }
}

/// The processor handle. All keys, certificates, bundles, and crypto
/// sessions hang off one of these; dropping it zeroizes every RAM record.
pub struct SecProcessor {
    key_dir: PathBuf,
    cert_dir: PathBuf,
    bundle_dir: PathBuf,
    device_id: [u8; DEVICE_ID_LEN],
    root_key: [u8; AES_BLOCK_SIZE],
    state: Mutex<ObjectStore>,
    custom_container: Option<Box<dyn CustomKeyContainer>>,
}

fn resolve_storage_dir(provided: Option<&Path>, default_dir: &str) -> SecResult<PathBuf> {
    let dir = match provided {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from(default_dir),
    };
    if dir.as_os_str().len() >= MAX_FILE_PATH_LEN - 2 {
        warn!("storage directory name is too long");
        return Err(SecError::Failure);
    }
    fs::create_dir_all(&dir).map_err(|e| {
        warn!(dir = %dir.display(), "could not create storage directory: {}", e);
        SecError::Failure
    })?;
    Ok(dir)
}

impl SecProcessor {
    /// Create a processor: resolve and create the storage directories,
    /// install the fake root of trust, generate the store keys, and derive
    /// the certificate-store MAC key.
    pub fn new(params: ProcessorInitParams) -> SecResult<SecProcessor> {
        let key_dir =
            resolve_storage_dir(params.keystorage_dir.as_deref(), KEYSTORAGE_DEFAULT_DIR)?;
        let cert_dir =
            resolve_storage_dir(params.certstorage_dir.as_deref(), CERTSTORAGE_DEFAULT_DIR)?;
        let bundle_dir = resolve_storage_dir(
            params.bundlestorage_dir.as_deref(),
            BUNDLESTORAGE_DEFAULT_DIR,
        )?;

        let proc = SecProcessor {
            key_dir,
            cert_dir,
            bundle_dir,
            device_id: [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
            root_key: [
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
                0x0D, 0x0E, 0x0F,
            ],
            state: Mutex::new(ObjectStore::default()),
            custom_container: params.custom_container,
        };

        proc.provision_store_key(object_id::STORE_AES_KEY, STORE_AES_LADDER_INPUT)?;
        proc.provision_store_key(object_id::STORE_MACKEYGEN_KEY, STORE_MAC_LADDER_INPUT)?;

        derive::derive_concat_kdf(
            &proc,
            object_id::CERTSTORE_KEY,
            KeyType::Hmac256,
            StorageLoc::RamSoftWrapped,
            DigestAlgorithm::Sha256,
            CERTSTORE_NONCE,
            CERTSTORE_OTHER_INFO,
        )?;

        Ok(proc)
    }

    /// Wrap ladder inputs for one of the store keys into an unencrypted,
    /// unsigned store blob and provision it at its reserved id.
    fn provision_store_key(&self, id: ObjectId, domain: &[u8]) -> SecResult<()> {
        let inputs = ladder::generate_store_ladder_inputs(self, domain);
        let blob = store::store_data(
            self,
            false,
            false,
            KeyContainer::Derived.wire_id(),
            &inputs.to_bytes(),
        )?;
        KeyHandle::provision(
            self,
            id,
            StorageLoc::RamSoftWrapped,
            KeyContainer::Store,
            &blob,
        )
    }

    /// The constant device id of this reference platform.
    pub fn device_id(&self) -> [u8; DEVICE_ID_LEN] {
        self.device_id
    }

    /// Minimum ladder depth for `root`. Only the device-unique root is
    /// backed here, with its fixed two-stage ladder.
    pub fn key_ladder_min_depth(&self, root: KeyLadderRoot) -> usize {
        match root {
            KeyLadderRoot::Unique => 2,
            _ => 0,
        }
    }

    /// Maximum ladder depth for `root`.
    pub fn key_ladder_max_depth(&self, root: KeyLadderRoot) -> usize {
        match root {
            KeyLadderRoot::Unique => 2,
            _ => 0,
        }
    }

    /// Consume the processor, zeroizing all RAM-resident records.
    pub fn release(self) {}

    pub(crate) fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    pub(crate) fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    pub(crate) fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub(crate) fn root_key(&self) -> [u8; AES_BLOCK_SIZE] {
        self.root_key
    }

    pub(crate) fn custom_container(&self) -> Option<&dyn CustomKeyContainer> {
        self.custom_container.as_deref()
    }

    /// Run `f` under the RAM-table lock. Callers must not re-enter.
    pub(crate) fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ObjectStore) -> R,
    {
        let mut state = self.state.lock().expect("processor state poisoned");
        f(&mut state)
    }

    /// Clone a key record out of the repository.
    pub(crate) fn key_record(&self, id: ObjectId) -> SecResult<KeyRecord> {
        crate::repository::retrieve_key_record(self, id).map(|(_, record)| record)
    }
}

impl Drop for SecProcessor {
    fn drop(&mut self) {
        self.root_key.zeroize();
        // RAM records zeroize themselves on drop
        if let Ok(mut state) = self.state.lock() {
            state.keys.clear();
            state.certs.clear();
            state.bundles.clear();
        }
    }
}

impl fmt::Debug for SecProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecProcessor")
            .field("key_dir", &self.key_dir)
            .field("cert_dir", &self.cert_dir)
            .field("bundle_dir", &self.bundle_dir)
            .field("device_id", &hex::encode(self.device_id))
            .field("root_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
