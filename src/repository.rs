//! Object repository: RAM tables plus filesystem directories, indexed by
//! 64-bit object id.
//!
//! Each kind (key, certificate, bundle) is a two-tier store. RAM wins on
//! lookup. Files are named `<decimal_id>.<ext>`; keys and certificates
//! carry a sidecar `.info` file whose size is validated on read.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SecError, SecResult};
use crate::processor::SecProcessor;
use crate::types::{
    KeyContainer, KeyType, ObjectId, StorageLoc, BUNDLE_MAX_LEN, CERTIFICATE_MAX_LEN,
    KEYCONTAINER_MAX_LEN, MAC_MAX_LEN,
};

pub(crate) const KEY_EXT: &str = "key";
pub(crate) const KEYINFO_EXT: &str = "info";
pub(crate) const CERT_EXT: &str = "cert";
pub(crate) const BUNDLE_EXT: &str = "bundle";

/// Metadata persisted next to every wrapped key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key_type: KeyType,
    pub container: KeyContainer,
}

/// A wrapped key at rest. The container is always the opaque store form.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct KeyRecord {
    #[zeroize(skip)]
    pub info: KeyInfo,
    pub container: Vec<u8>,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("info", &self.info)
            .field("container_len", &self.container.len())
            .finish()
    }
}

/// A certificate at rest: canonical DER plus its store MAC.
#[derive(Debug, Clone)]
pub(crate) struct CertificateRecord {
    pub cert: Vec<u8>,
    pub mac: [u8; MAC_MAX_LEN],
}

/// An opaque bundle at rest.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct BundleRecord {
    pub data: Vec<u8>,
}

/// RAM tier of the repository, owned by the processor.
#[derive(Default)]
pub(crate) struct ObjectStore {
    pub keys: HashMap<ObjectId, KeyRecord>,
    pub certs: HashMap<ObjectId, CertificateRecord>,
    pub bundles: HashMap<ObjectId, BundleRecord>,
}

fn object_path(dir: &Path, object_id: ObjectId, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", object_id, ext))
}

/// Write a file, removing the partial artifact on failure.
fn write_file(path: &Path, data: &[u8]) -> SecResult<()> {
    if let Err(e) = fs::write(path, data) {
        warn!(path = %path.display(), "could not write object file: {}", e);
        let _ = fs::remove_file(path);
        return Err(SecError::Failure);
    }
    Ok(())
}

fn read_file_capped(path: &Path, max_len: usize) -> SecResult<Vec<u8>> {
    let data = fs::read(path).map_err(|e| {
        warn!(path = %path.display(), "could not read object file: {}", e);
        SecError::Failure
    })?;
    if data.len() > max_len {
        warn!(path = %path.display(), "object file exceeds the size bound");
        return Err(SecError::Failure);
    }
    Ok(data)
}

/// Enumerate object ids from file names carrying `ext` in `dir`.
fn list_dir_ids(dir: &Path, ext: &str) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return ids,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Ok(id) = stem.parse::<ObjectId>() {
                ids.push(id);
            }
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub(crate) fn retrieve_key_record(
    proc: &SecProcessor,
    object_id: ObjectId,
) -> SecResult<(StorageLoc, KeyRecord)> {
    if let Some(record) = proc.with_state(|state| state.keys.get(&object_id).cloned()) {
        return Ok((StorageLoc::Ram, record));
    }

    let key_path = object_path(proc.key_dir(), object_id, KEY_EXT);
    let info_path = object_path(proc.key_dir(), object_id, KEYINFO_EXT);
    if key_path.exists() && info_path.exists() {
        let container = read_file_capped(&key_path, KEYCONTAINER_MAX_LEN)?;
        let info_bytes = read_file_capped(&info_path, 64)?;
        let info: KeyInfo =
            bincode::deserialize(&info_bytes).map_err(|_| SecError::Failure)?;
        if bincode::serialized_size(&info).map_err(|_| SecError::Failure)? != info_bytes.len() as u64
        {
            warn!("key info file is not of the correct size");
            return Err(SecError::Failure);
        }
        return Ok((StorageLoc::File, KeyRecord { info, container }));
    }

    Err(SecError::NoSuchItem)
}

pub(crate) fn store_key_record(
    proc: &SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: KeyRecord,
) -> SecResult<()> {
    match location {
        loc if loc.is_ram() => {
            let _ = delete_key(proc, object_id);
            proc.with_state(|state| state.keys.insert(object_id, record));
            Ok(())
        }
        loc if loc.is_file() => {
            let _ = delete_key(proc, object_id);
            let key_path = object_path(proc.key_dir(), object_id, KEY_EXT);
            let info_path = object_path(proc.key_dir(), object_id, KEYINFO_EXT);
            let info_bytes =
                bincode::serialize(&record.info).map_err(|_| SecError::Failure)?;
            let result =
                write_file(&key_path, &record.container).and_then(|_| write_file(&info_path, &info_bytes));
            if result.is_err() {
                let _ = fs::remove_file(&key_path);
                let _ = fs::remove_file(&info_path);
            }
            result
        }
        StorageLoc::Oem => {
            warn!("cannot store keys in OEM storage on this platform");
            Err(SecError::Failure)
        }
        _ => Err(SecError::UnimplementedFeature),
    }
}

pub(crate) fn delete_key(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
    let mut found = 0usize;
    let mut deleted = 0usize;

    if proc
        .with_state(|state| state.keys.remove(&object_id))
        .is_some()
    {
        found += 1;
        deleted += 1;
    }

    let key_path = object_path(proc.key_dir(), object_id, KEY_EXT);
    let info_path = object_path(proc.key_dir(), object_id, KEYINFO_EXT);
    if key_path.exists() {
        let _ = fs::remove_file(&key_path);
        found += 1;
        if !key_path.exists() {
            deleted += 1;
        }
    }
    if !key_path.exists() && info_path.exists() {
        let _ = fs::remove_file(&info_path);
    }

    if found == 0 {
        return Err(SecError::NoSuchItem);
    }
    if found != deleted {
        return Err(SecError::ItemNonRemovable);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

pub(crate) fn retrieve_certificate_record(
    proc: &SecProcessor,
    object_id: ObjectId,
) -> SecResult<(StorageLoc, CertificateRecord)> {
    if let Some(record) = proc.with_state(|state| state.certs.get(&object_id).cloned()) {
        return Ok((StorageLoc::Ram, record));
    }

    let cert_path = object_path(proc.cert_dir(), object_id, CERT_EXT);
    let info_path = object_path(proc.cert_dir(), object_id, KEYINFO_EXT);
    if cert_path.exists() && info_path.exists() {
        let cert = read_file_capped(&cert_path, CERTIFICATE_MAX_LEN)?;
        let mac_bytes = read_file_capped(&info_path, MAC_MAX_LEN)?;
        if mac_bytes.len() != MAC_MAX_LEN {
            warn!("certificate info file is not of the correct size");
            return Err(SecError::Failure);
        }
        let mut mac = [0u8; MAC_MAX_LEN];
        mac.copy_from_slice(&mac_bytes);
        return Ok((StorageLoc::File, CertificateRecord { cert, mac }));
    }

    Err(SecError::NoSuchItem)
}

pub(crate) fn store_certificate_record(
    proc: &SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: CertificateRecord,
) -> SecResult<()> {
    match location {
        StorageLoc::Ram => {
            let _ = delete_certificate(proc, object_id);
            proc.with_state(|state| state.certs.insert(object_id, record));
            Ok(())
        }
        StorageLoc::File => {
            let _ = delete_certificate(proc, object_id);
            let cert_path = object_path(proc.cert_dir(), object_id, CERT_EXT);
            let info_path = object_path(proc.cert_dir(), object_id, KEYINFO_EXT);
            let result = write_file(&cert_path, &record.cert)
                .and_then(|_| write_file(&info_path, &record.mac));
            if result.is_err() {
                let _ = fs::remove_file(&cert_path);
                let _ = fs::remove_file(&info_path);
            }
            result
        }
        StorageLoc::Oem => {
            warn!("cannot store certificates in OEM storage on this platform");
            Err(SecError::Failure)
        }
        _ => Err(SecError::UnimplementedFeature),
    }
}

pub(crate) fn delete_certificate(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
    let mut found = 0usize;
    let mut deleted = 0usize;

    if proc
        .with_state(|state| state.certs.remove(&object_id))
        .is_some()
    {
        found += 1;
        deleted += 1;
    }

    let cert_path = object_path(proc.cert_dir(), object_id, CERT_EXT);
    let info_path = object_path(proc.cert_dir(), object_id, KEYINFO_EXT);
    if cert_path.exists() {
        let _ = fs::remove_file(&cert_path);
        found += 1;
        if !cert_path.exists() {
            deleted += 1;
        }
    }
    if !cert_path.exists() && info_path.exists() {
        let _ = fs::remove_file(&info_path);
    }

    if found == 0 {
        return Err(SecError::NoSuchItem);
    }
    if found != deleted {
        return Err(SecError::ItemNonRemovable);
    }
    Ok(())
}

/// Enumerate certificate ids across both tiers, capped at `max_items`.
pub(crate) fn list_certificates(proc: &SecProcessor, max_items: usize) -> Vec<ObjectId> {
    let mut ids: BTreeSet<ObjectId> =
        proc.with_state(|state| state.certs.keys().copied().collect());
    for id in list_dir_ids(proc.cert_dir(), CERT_EXT) {
        ids.insert(id);
    }
    ids.into_iter().take(max_items).collect()
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

pub(crate) fn retrieve_bundle_record(
    proc: &SecProcessor,
    object_id: ObjectId,
) -> SecResult<(StorageLoc, BundleRecord)> {
    if let Some(record) = proc.with_state(|state| state.bundles.get(&object_id).cloned()) {
        return Ok((StorageLoc::Ram, record));
    }

    let bundle_path = object_path(proc.bundle_dir(), object_id, BUNDLE_EXT);
    if bundle_path.exists() {
        let data = read_file_capped(&bundle_path, BUNDLE_MAX_LEN)?;
        return Ok((StorageLoc::File, BundleRecord { data }));
    }

    Err(SecError::NoSuchItem)
}

pub(crate) fn store_bundle_record(
    proc: &SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: BundleRecord,
) -> SecResult<()> {
    match location {
        StorageLoc::Ram => {
            let _ = delete_bundle(proc, object_id);
            proc.with_state(|state| state.bundles.insert(object_id, record));
            Ok(())
        }
        StorageLoc::File => {
            let _ = delete_bundle(proc, object_id);
            let bundle_path = object_path(proc.bundle_dir(), object_id, BUNDLE_EXT);
            write_file(&bundle_path, &record.data)
        }
        StorageLoc::Oem => {
            warn!("cannot store bundles in OEM storage on this platform");
            Err(SecError::Failure)
        }
        _ => Err(SecError::UnimplementedFeature),
    }
}

pub(crate) fn delete_bundle(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
    let mut found = 0usize;
    let mut deleted = 0usize;

    if proc
        .with_state(|state| state.bundles.remove(&object_id))
        .is_some()
    {
        found += 1;
        deleted += 1;
    }

    let bundle_path = object_path(proc.bundle_dir(), object_id, BUNDLE_EXT);
    if bundle_path.exists() {
        let _ = fs::remove_file(&bundle_path);
        found += 1;
        if !bundle_path.exists() {
            deleted += 1;
        }
    }

    if found == 0 {
        return Err(SecError::NoSuchItem);
    }
    if found != deleted {
        warn!("bundle is stored in a non-removable location");
        return Err(SecError::ItemNonRemovable);
    }
    Ok(())
}
