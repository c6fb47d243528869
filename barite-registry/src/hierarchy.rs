//! Group hierarchy operations.
//!
//! The hierarchy is two levels deep: the root group (ID 0) plus one layer
//! of child groups. Every non-group item lives in exactly one group, and
//! the owning group's item list carries a denormalized copy of the item's
//! display name so listings need no per-item lookup.

use barite_model::Group;
use barite_types::{ItemId, ItemKind, ROOT_GROUP};
use tracing::{info, warn};

use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    /// Creates a child group. Only the root may be a parent; deeper nesting
    /// is rejected before anything is written.
    pub fn create_group(&self, display_name: &str, parent: ItemId) -> RegistryResult<ItemId> {
        if parent != ROOT_GROUP {
            return Err(RegistryError::Unsupported(
                "groups cannot be nested below the root".to_string(),
            ));
        }
        let id = self.inner.ids.next()?;
        let group = Group {
            display_name: display_name.to_string(),
            parent_group: ROOT_GROUP,
            ..Group::default()
        };
        self.inner.group_store.put(id, &group)?;
        self.attach_item(ROOT_GROUP, ItemKind::Group, id, display_name)?;
        self.inner.groups.lock().unwrap().insert(id, group);
        info!(id, display_name, "group created");
        Ok(id)
    }

    /// One group by ID.
    pub fn get_group(&self, id: ItemId) -> Option<Group> {
        self.inner.groups.lock().unwrap().get(&id).cloned()
    }

    /// Every group, sorted by ID.
    pub fn list_groups(&self) -> Vec<(ItemId, Group)> {
        let mut out: Vec<_> = self
            .inner
            .groups
            .lock()
            .unwrap()
            .iter()
            .map(|(id, g)| (*id, g.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Renames a group and syncs the denormalized entry in its parent's
    /// item list.
    pub fn rename_group(&self, id: ItemId, display_name: &str) -> RegistryResult<()> {
        let parent = {
            let mut groups = self.inner.groups.lock().unwrap();
            let group = groups
                .get_mut(&id)
                .ok_or_else(|| RegistryError::NotFound(format!("group {id}")))?;
            group.display_name = display_name.to_string();
            self.inner.group_store.put(id, group)?;
            group.parent_group
        };
        if id != ROOT_GROUP {
            self.sync_item_name(parent, ItemKind::Group, id, display_name)?;
        }
        Ok(())
    }

    /// Deletes a group after relocating its items into `move_items_to`.
    /// Both the target's existence and the root-group protection are
    /// checked before any record changes.
    pub fn delete_group(&self, id: ItemId, move_items_to: ItemId) -> RegistryResult<()> {
        if id == ROOT_GROUP {
            return Err(RegistryError::Forbidden(
                "the root group cannot be deleted".to_string(),
            ));
        }
        if move_items_to == id {
            return Err(RegistryError::Validation(
                "cannot move items into the group being deleted".to_string(),
            ));
        }
        let items = {
            let groups = self.inner.groups.lock().unwrap();
            let group = groups
                .get(&id)
                .ok_or_else(|| RegistryError::NotFound(format!("group {id}")))?;
            if !groups.contains_key(&move_items_to) {
                return Err(RegistryError::NotFound(format!("group {move_items_to}")));
            }
            group.items.clone()
        };

        for item in items {
            self.move_item(item.kind, item.item_id, move_items_to)?;
        }

        self.detach_item(ROOT_GROUP, ItemKind::Group, id)?;
        self.inner.group_store.delete(id)?;
        self.inner.groups.lock().unwrap().remove(&id);
        info!(id, move_items_to, "group deleted");
        Ok(())
    }

    /// Moves one item into a different group: removed from the old group's
    /// list, appended to the new one, parent pointer rewritten. Groups
    /// themselves cannot move (that would create a second level of nesting).
    pub fn move_item(&self, kind: ItemKind, item_id: ItemId, dest: ItemId) -> RegistryResult<()> {
        if kind == ItemKind::Group {
            return Err(RegistryError::Unsupported(
                "groups cannot be moved into other groups".to_string(),
            ));
        }
        if !self.inner.groups.lock().unwrap().contains_key(&dest) {
            return Err(RegistryError::NotFound(format!("group {dest}")));
        }
        let (old_parent, display_name) = self.reparent(kind, item_id, dest)?;
        if old_parent == dest {
            return Ok(());
        }
        self.detach_item(old_parent, kind, item_id)?;
        self.attach_item(dest, kind, item_id, &display_name)?;
        Ok(())
    }

    /// Rewrites an item's own parent pointer and persists its record.
    /// Returns the previous parent and the item's display name.
    fn reparent(
        &self,
        kind: ItemKind,
        item_id: ItemId,
        dest: ItemId,
    ) -> RegistryResult<(ItemId, String)> {
        use barite_model::GroupMember;

        macro_rules! reparent_kind {
            ($map:ident, $store:ident) => {{
                let mut map = self.inner.$map.lock().unwrap();
                let item = map
                    .get_mut(&item_id)
                    .ok_or_else(|| RegistryError::NotFound(format!("{kind} {item_id}")))?;
                let old = item.parent_group();
                item.set_parent(dest);
                self.inner.$store.put(item_id, item)?;
                (old, item.display_name())
            }};
        }

        Ok(match kind {
            ItemKind::Rule => reparent_kind!(rules, rule_store),
            ItemKind::Trigger => reparent_kind!(triggers, trigger_store),
            ItemKind::Job => reparent_kind!(jobs, job_store),
            ItemKind::Resource => reparent_kind!(resources, resource_store),
            ItemKind::Group => unreachable!("rejected above"),
        })
    }

    /// Appends an item to a group's list and persists the group.
    pub(crate) fn attach_item(
        &self,
        group_id: ItemId,
        kind: ItemKind,
        item_id: ItemId,
        display_name: &str,
    ) -> RegistryResult<()> {
        let mut groups = self.inner.groups.lock().unwrap();
        let group = groups
            .get_mut(&group_id)
            .ok_or_else(|| RegistryError::NotFound(format!("group {group_id}")))?;
        if group.position_of(kind, item_id).is_none() {
            group.items.push(barite_model::GroupItem {
                kind,
                item_id,
                display_name: display_name.to_string(),
            });
        }
        self.inner.group_store.put(group_id, group)?;
        Ok(())
    }

    /// Removes an item from a group's list and persists the group. A stale
    /// list without the item is tolerated.
    pub(crate) fn detach_item(
        &self,
        group_id: ItemId,
        kind: ItemKind,
        item_id: ItemId,
    ) -> RegistryResult<()> {
        let mut groups = self.inner.groups.lock().unwrap();
        let group = groups
            .get_mut(&group_id)
            .ok_or_else(|| RegistryError::NotFound(format!("group {group_id}")))?;
        match group.position_of(kind, item_id) {
            Some(pos) => {
                group.items.remove(pos);
                self.inner.group_store.put(group_id, group)?;
            }
            None => {
                warn!(group = group_id, %kind, item = item_id, "item not in group listing at removal");
            }
        }
        Ok(())
    }

    /// Rewrites the denormalized display name in a group's item list.
    pub(crate) fn sync_item_name(
        &self,
        group_id: ItemId,
        kind: ItemKind,
        item_id: ItemId,
        display_name: &str,
    ) -> RegistryResult<()> {
        let mut groups = self.inner.groups.lock().unwrap();
        let group = groups
            .get_mut(&group_id)
            .ok_or_else(|| RegistryError::NotFound(format!("group {group_id}")))?;
        if let Some(pos) = group.position_of(kind, item_id) {
            group.items[pos].display_name = display_name.to_string();
            self.inner.group_store.put(group_id, group)?;
        }
        Ok(())
    }
}
