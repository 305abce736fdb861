//! Bundle objects: opaque data blobs the processor stores but never
//! interprets.

use tracing::warn;

use crate::error::{SecError, SecResult};
use crate::processor::SecProcessor;
use crate::repository::{self, BundleRecord};
use crate::types::{object_id, ObjectId, StorageLoc, BUNDLE_MAX_LEN};

/// Opaque reference to a provisioned bundle.
pub struct BundleHandle<'a> {
    proc: &'a SecProcessor,
    object_id: ObjectId,
    location: StorageLoc,
    record: BundleRecord,
}

impl<'a> BundleHandle<'a> {
    pub fn get_instance(proc: &'a SecProcessor, object_id: ObjectId) -> SecResult<BundleHandle<'a>> {
        if object_id == object_id::INVALID {
            return Err(SecError::InvalidParameters);
        }

        let (location, record) = repository::retrieve_bundle_record(proc, object_id)?;
        Ok(BundleHandle {
            proc,
            object_id,
            location,
            record,
        })
    }

    /// Install `data` at `object_id`, replacing any existing bundle.
    pub fn provision(
        proc: &SecProcessor,
        object_id: ObjectId,
        location: StorageLoc,
        data: &[u8],
    ) -> SecResult<()> {
        if object_id == object_id::INVALID {
            warn!("cannot provision an object with the invalid id");
            return Err(SecError::Failure);
        }
        if location == StorageLoc::Oem {
            warn!("cannot provision bundles into OEM storage on this platform");
            return Err(SecError::Failure);
        }
        if data.len() > BUNDLE_MAX_LEN {
            warn!("input bundle is too large");
            return Err(SecError::Failure);
        }

        let record = BundleRecord {
            data: data.to_vec(),
        };
        repository::store_bundle_record(proc, object_id, location, record)
    }

    /// Remove the bundle from every storage tier.
    pub fn delete(proc: &SecProcessor, object_id: ObjectId) -> SecResult<()> {
        repository::delete_bundle(proc, object_id)
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn location(&self) -> StorageLoc {
        self.location
    }

    pub fn processor(&self) -> &'a SecProcessor {
        self.proc
    }

    /// Copy the bundle bytes out. `None` queries the required size.
    pub fn export(&self, buffer: Option<&mut [u8]>) -> SecResult<usize> {
        let len = self.record.data.len();
        match buffer {
            None => Ok(len),
            Some(buffer) => {
                if buffer.len() < len {
                    return Err(SecError::BufferTooSmall);
                }
                buffer[..len].copy_from_slice(&self.record.data);
                Ok(len)
            }
        }
    }

    /// Consume the handle.
    pub fn release(self) {}
}

impl std::fmt::Debug for BundleHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleHandle")
            .field("object_id", &self.object_id)
            .field("location", &self.location)
            .field("len", &self.record.data.len())
            .finish()
    }
}
