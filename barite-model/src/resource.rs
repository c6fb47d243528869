use crate::GroupMember;
use serde::{Deserialize, Serialize};

/// Metadata for a binary asset. The bytes themselves live in the
/// content-addressed blob area under `{sha256_sum}{ext}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub file_name: String,
    /// Extension including the leading dot, or empty.
    #[serde(default)]
    pub ext: String,
    /// Hex SHA-256 of the blob bytes.
    #[serde(default)]
    pub sha256_sum: String,
    #[serde(default)]
    pub parent_group: u64,
}

impl Resource {
    /// Splits `name.ext` into stem and dotted extension.
    #[must_use]
    pub fn split_file_name(full: &str) -> (String, String) {
        match full.rfind('.') {
            Some(0) | None => (full.to_string(), String::new()),
            Some(idx) => (full[..idx].to_string(), full[idx..].to_string()),
        }
    }
}

impl GroupMember for Resource {
    fn display_name(&self) -> String {
        format!("{}{}", self.file_name, self.ext)
    }

    fn parent_group(&self) -> u64 {
        self.parent_group
    }

    fn set_parent(&mut self, parent: u64) {
        self.parent_group = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_splitting() {
        assert_eq!(
            Resource::split_file_name("photo.png"),
            ("photo".into(), ".png".into())
        );
        assert_eq!(
            Resource::split_file_name("archive.tar.gz"),
            ("archive.tar".into(), ".gz".into())
        );
        assert_eq!(Resource::split_file_name("README"), ("README".into(), String::new()));
        assert_eq!(
            Resource::split_file_name(".hidden"),
            (".hidden".into(), String::new())
        );
    }

    #[test]
    fn display_name_joins_ext() {
        let r = Resource {
            file_name: "photo".into(),
            ext: ".png".into(),
            ..Resource::default()
        };
        assert_eq!(r.display_name(), "photo.png");
    }
}
