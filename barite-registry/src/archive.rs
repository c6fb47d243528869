//! Group export and import.
//!
//! Export walks a group's item list, serializes each record into the
//! bundle manifest, and packs resource bytes alongside as digest-named
//! blobs. Import is the mirror: a fresh group under the root, fresh IDs
//! for every item, and per-item failures logged and skipped so one bad
//! record cannot sink a whole bundle.

use tracing::{info, warn};

use barite_archive::{Bundle, BundleBlob, GroupManifest, ManifestItem};
use barite_model::{Group, GroupMember, Job, Resource, Rule, Trigger};
use barite_types::{ItemId, ItemKind, ROOT_GROUP};

use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    /// Packs a group into bundle bytes, stamped with the caller's plugin
    /// name and version; an empty name falls back to the group's stored
    /// plugin name, then its display name. Child groups cannot be nested
    /// in a bundle and are skipped with a warning.
    pub fn export_group(
        &self,
        id: ItemId,
        plugin_name: &str,
        plugin_version: i64,
    ) -> RegistryResult<Vec<u8>> {
        let group = self
            .get_group(id)
            .ok_or_else(|| RegistryError::NotFound(format!("group {id}")))?;

        let mut items = Vec::new();
        let mut blobs = Vec::new();
        for entry in &group.items {
            let body = match entry.kind {
                ItemKind::Rule => self.get_rule(entry.item_id).map(|r| serde_json::to_value(r)),
                ItemKind::Trigger => self
                    .get_trigger(entry.item_id)
                    .map(|t| serde_json::to_value(t)),
                ItemKind::Job => self.get_job(entry.item_id).map(|j| serde_json::to_value(j)),
                ItemKind::Resource => match self.get_resource(entry.item_id) {
                    Some(resource) => {
                        let data = self.inner.blobs.read(&resource.sha256_sum, &resource.ext)?;
                        blobs.push(BundleBlob {
                            digest: resource.sha256_sum.clone(),
                            ext: resource.ext.clone(),
                            data,
                        });
                        Some(serde_json::to_value(resource))
                    }
                    None => None,
                },
                ItemKind::Group => {
                    warn!(group = id, child = entry.item_id, "nested group not exported");
                    continue;
                }
            };
            match body {
                Some(Ok(body)) => items.push(ManifestItem {
                    kind: entry.kind,
                    display_name: entry.display_name.clone(),
                    body,
                }),
                Some(Err(err)) => {
                    return Err(RegistryError::Archive(err.into()));
                }
                None => {
                    warn!(
                        group = id,
                        kind = %entry.kind,
                        item = entry.item_id,
                        "listed item has no record, not exported"
                    );
                }
            }
        }

        let plugin_name = if !plugin_name.is_empty() {
            plugin_name.to_string()
        } else if !group.plugin_name.is_empty() {
            group.plugin_name.clone()
        } else {
            group.display_name.clone()
        };
        let bundle = Bundle {
            manifest: GroupManifest {
                display_name: group.display_name.clone(),
                plugin_name,
                plugin_version,
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                items,
            },
            blobs,
        };
        Ok(bundle.write()?)
    }

    /// Unpacks bundle bytes into a new group under the root. Every item
    /// gets a fresh ID; blob bytes already present locally are reused.
    /// Returns the new group's ID.
    pub fn import_bundle(&self, bytes: &[u8]) -> RegistryResult<ItemId> {
        let bundle = Bundle::read(bytes)?;

        for blob in &bundle.blobs {
            self.inner
                .blobs
                .store_verified(&blob.digest, &blob.ext, &blob.data)?;
        }

        let group_id = self.inner.ids.next()?;
        let group = Group {
            display_name: bundle.manifest.display_name.clone(),
            plugin_name: bundle.manifest.plugin_name.clone(),
            plugin_version: bundle.manifest.plugin_version,
            items: Vec::new(),
            parent_group: ROOT_GROUP,
        };
        self.inner.group_store.put(group_id, &group)?;
        self.attach_item(ROOT_GROUP, ItemKind::Group, group_id, &group.display_name)?;
        self.inner.groups.lock().unwrap().insert(group_id, group);

        let mut imported = 0usize;
        for item in &bundle.manifest.items {
            match self.import_item(group_id, item) {
                Ok(()) => imported += 1,
                Err(err) => {
                    warn!(
                        kind = %item.kind,
                        display_name = item.display_name,
                        %err,
                        "bundle item skipped"
                    );
                }
            }
        }
        info!(
            group_id,
            imported,
            total = bundle.manifest.items.len(),
            plugin = bundle.manifest.plugin_name,
            "bundle imported"
        );
        Ok(group_id)
    }

    fn import_item(&self, group_id: ItemId, item: &ManifestItem) -> RegistryResult<()> {
        match item.kind {
            ItemKind::Rule => {
                let rule: Rule = decode_body(&item.body)?;
                self.create_rule(group_id, rule)?;
            }
            ItemKind::Trigger => {
                let trigger: Trigger = decode_body(&item.body)?;
                self.create_trigger(group_id, trigger)?;
            }
            ItemKind::Job => {
                let job: Job = decode_body(&item.body)?;
                self.create_job(group_id, job)?;
            }
            ItemKind::Resource => {
                let resource: Resource = decode_body(&item.body)?;
                self.import_resource(group_id, resource)?;
            }
            ItemKind::Group => {
                return Err(RegistryError::Unsupported(
                    "bundles cannot contain nested groups".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Imports one resource record whose blob was already unpacked. Unlike
    /// upload, an existing digest binding is left pointing at the original
    /// resource and this record still gets its own entry.
    fn import_resource(&self, group_id: ItemId, mut resource: Resource) -> RegistryResult<ItemId> {
        if !self
            .inner
            .blobs
            .contains(&resource.sha256_sum, &resource.ext)
        {
            return Err(RegistryError::Integrity(format!(
                "bundle record references missing blob {}{}",
                resource.sha256_sum, resource.ext
            )));
        }
        resource.parent_group = group_id;

        let id = self.inner.ids.next()?;
        self.inner.resource_store.put(id, &resource)?;
        self.attach_item(group_id, ItemKind::Resource, id, &resource.display_name())?;
        self.put_hash_index_if_absent(&resource.sha256_sum, id)?;
        self.inner.resources.lock().unwrap().insert(id, resource);
        Ok(id)
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &serde_json::Value) -> RegistryResult<T> {
    serde_json::from_value(body.clone())
        .map_err(|err| RegistryError::Validation(format!("undecodable bundle record: {err}")))
}
