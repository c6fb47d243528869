//! Resource lifecycle: binary assets stored content-addressed.
//!
//! Upload hashes the bytes first; if a resource with the same digest
//! already exists the upload is answered with the existing ID and nothing
//! is written. The digest→ID index lives under its own key prefix so the
//! lookup is a single point read.

use std::path::PathBuf;

use tracing::{info, warn};

use barite_model::{GroupMember, Resource};
use barite_storage::{id_from_bytes, id_to_bytes, BlobStore};
use barite_types::{ItemId, ItemKind};

use crate::registry::RESOURCE_HASH_PREFIX;
use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    /// Stores an uploaded file. Returns the resource ID and whether a new
    /// record was created; an upload whose bytes are already present
    /// answers with the existing ID regardless of the offered file name.
    pub fn upload_resource(
        &self,
        parent: ItemId,
        file_name: &str,
        bytes: &[u8],
    ) -> RegistryResult<(ItemId, bool)> {
        if !self.inner.groups.lock().unwrap().contains_key(&parent) {
            return Err(RegistryError::NotFound(format!("group {parent}")));
        }
        let digest = BlobStore::digest(bytes);
        if let Some(existing) = self.resource_by_hash(&digest)? {
            return Ok((existing, false));
        }

        let (stem, ext) = Resource::split_file_name(file_name);
        self.inner.blobs.store(bytes, &ext)?;

        let resource = Resource {
            file_name: stem,
            ext,
            sha256_sum: digest.clone(),
            parent_group: parent,
        };
        let id = self.inner.ids.next()?;
        self.inner.resource_store.put(id, &resource)?;
        self.attach_item(parent, ItemKind::Resource, id, &resource.display_name())?;
        self.put_hash_index(&digest, id)?;
        self.inner.resources.lock().unwrap().insert(id, resource);
        info!(id, digest, "resource stored");
        Ok((id, true))
    }

    pub fn get_resource(&self, id: ItemId) -> Option<Resource> {
        self.inner.resources.lock().unwrap().get(&id).cloned()
    }

    pub fn list_resources(&self) -> Vec<(ItemId, Resource)> {
        let mut out: Vec<_> = self
            .inner
            .resources
            .lock()
            .unwrap()
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Resolves a hex digest to the resource that carries it.
    pub fn resource_by_hash(&self, digest: &str) -> RegistryResult<Option<ItemId>> {
        match self.inner.kv.get(&hash_index_key(digest))? {
            Some(bytes) => Ok(Some(id_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Renames a resource. Only the name changes; the extension is part of
    /// the stored blob's identity and moves with the new name's extension
    /// only in the record, not on disk.
    pub fn rename_resource(&self, id: ItemId, file_name: &str) -> RegistryResult<()> {
        let parent = {
            let mut resources = self.inner.resources.lock().unwrap();
            let resource = resources
                .get_mut(&id)
                .ok_or_else(|| RegistryError::NotFound(format!("resource {id}")))?;
            let (stem, ext) = Resource::split_file_name(file_name);
            resource.file_name = stem;
            if !ext.is_empty() {
                resource.ext = ext;
            }
            self.inner.resource_store.put(id, resource)?;
            resource.parent_group
        };
        let display_name = self
            .get_resource(id)
            .map(|r| r.display_name())
            .unwrap_or_default();
        self.sync_item_name(parent, ItemKind::Resource, id, &display_name)?;
        Ok(())
    }

    /// Deletes the record and the digest index entry. The blob file itself
    /// stays on disk; another upload of the same bytes reuses it.
    pub fn delete_resource(&self, id: ItemId) -> RegistryResult<()> {
        let resource = self
            .get_resource(id)
            .ok_or_else(|| RegistryError::NotFound(format!("resource {id}")))?;

        if let Err(err) = self.inner.kv.delete(&hash_index_key(&resource.sha256_sum)) {
            warn!(id, %err, "failed to delete resource hash index entry");
        }
        self.inner.resource_store.delete(id)?;
        self.detach_item(resource.parent_group, ItemKind::Resource, id)?;
        self.inner.resources.lock().unwrap().remove(&id);
        info!(id, "resource deleted");
        Ok(())
    }

    /// Reads a resource's bytes back from the blob area.
    pub fn read_resource(&self, id: ItemId) -> RegistryResult<Vec<u8>> {
        let resource = self
            .get_resource(id)
            .ok_or_else(|| RegistryError::NotFound(format!("resource {id}")))?;
        Ok(self.inner.blobs.read(&resource.sha256_sum, &resource.ext)?)
    }

    /// Filesystem path of a resource's blob, for attachment serving.
    pub fn resource_path(&self, id: ItemId) -> RegistryResult<PathBuf> {
        let resource = self
            .get_resource(id)
            .ok_or_else(|| RegistryError::NotFound(format!("resource {id}")))?;
        Ok(self
            .inner
            .blobs
            .path_for(&resource.sha256_sum, &resource.ext))
    }

    /// Writes the digest→ID index entry, leaving an existing binding alone.
    pub(crate) fn put_hash_index_if_absent(
        &self,
        digest: &str,
        id: ItemId,
    ) -> RegistryResult<()> {
        if self.inner.kv.get(&hash_index_key(digest))?.is_none() {
            self.put_hash_index(digest, id)?;
        }
        Ok(())
    }

    fn put_hash_index(&self, digest: &str, id: ItemId) -> RegistryResult<()> {
        self.inner
            .kv
            .put(&hash_index_key(digest), &id_to_bytes(id))?;
        Ok(())
    }
}

/// Index keys append the raw 32-byte digest, not its hex form.
fn hash_index_key(digest: &str) -> Vec<u8> {
    let mut key = RESOURCE_HASH_PREFIX.to_vec();
    match hex::decode(digest) {
        Ok(raw) => key.extend_from_slice(&raw),
        // digests come out of the blob store as valid hex; tolerate a
        // malformed one by indexing it verbatim
        Err(_) => key.extend_from_slice(digest.as_bytes()),
    }
    key
}
