use crate::GroupMember;
use barite_types::{ItemId, ItemKind};
use serde::{Deserialize, Serialize};

/// One entry in a group's item list. `display_name` is a denormalized copy
/// of the item's own name, kept in sync on rename so listings need no join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub kind: ItemKind,
    pub item_id: ItemId,
    #[serde(default)]
    pub display_name: String,
}

/// A node in the (two-level) group hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub display_name: String,
    /// Set when the group was created by a bundle import.
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_version: i64,
    /// Insertion-ordered children; `(kind, item_id)` pairs are unique.
    #[serde(default)]
    pub items: Vec<GroupItem>,
    /// 0 for children of the root; the root's own parent is 0 as well.
    #[serde(default)]
    pub parent_group: u64,
}

impl Group {
    /// A fresh root group for first boot.
    #[must_use]
    pub fn root() -> Self {
        Self {
            display_name: "root group".to_string(),
            plugin_name: String::new(),
            plugin_version: 0,
            items: Vec::new(),
            parent_group: 0,
        }
    }

    /// Position of an item in this group's list.
    #[must_use]
    pub fn position_of(&self, kind: ItemKind, item_id: ItemId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.kind == kind && item.item_id == item_id)
    }
}

impl Default for Group {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            plugin_name: String::new(),
            plugin_version: 0,
            items: Vec::new(),
            parent_group: 0,
        }
    }
}

impl GroupMember for Group {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn parent_group(&self) -> u64 {
        self.parent_group
    }

    fn set_parent(&mut self, parent: u64) {
        self.parent_group = parent;
    }
}
