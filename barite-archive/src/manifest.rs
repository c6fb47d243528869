//! Bundle manifest (`plugin.dat`).

use barite_types::ItemKind;
use serde::{Deserialize, Serialize};

/// One exported item: its kind, its listed name, and its serialized record.
/// IDs are deliberately absent — they belong to the exporting instance's
/// ID space and are reallocated on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub kind: ItemKind,
    #[serde(default)]
    pub display_name: String,
    /// The entity record as stored (JSON), parent pointer included but
    /// ignored on import.
    pub body: serde_json::Value,
}

/// The manifest carried in every bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupManifest {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_version: i64,
    /// Version of the exporting application, informational only.
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}
