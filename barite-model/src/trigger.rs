use crate::rule::{default_active, default_block, default_priority};
use crate::GroupMember;
use serde::{Deserialize, Serialize};

/// A reaction to a bus notice rather than a message pattern.
///
/// `event_type` is `category` or `category/subtype`; a bare category
/// matches every subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub event_type: String,
    /// Group allow-list; empty means any group.
    #[serde(default)]
    pub group_filter: Vec<i64>,
    /// User allow-list; empty means any user.
    #[serde(default)]
    pub user_filter: Vec<i64>,
    #[serde(default)]
    pub response_template: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_block")]
    pub block_following: bool,
    #[serde(default)]
    pub parent_group: u64,
}

impl Trigger {
    /// Splits `event_type` into category and optional subtype.
    #[must_use]
    pub fn category_parts(&self) -> (&str, Option<&str>) {
        match self.event_type.split_once('/') {
            Some((category, subtype)) => (category, Some(subtype)),
            None => (self.event_type.as_str(), None),
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            active: true,
            event_type: String::new(),
            group_filter: Vec::new(),
            user_filter: Vec::new(),
            response_template: String::new(),
            priority: 50,
            block_following: true,
            parent_group: 0,
        }
    }
}

impl GroupMember for Trigger {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_with_and_without_subtype() {
        let mut t = Trigger {
            event_type: "member_join".into(),
            ..Trigger::default()
        };
        assert_eq!(t.category_parts(), ("member_join", None));
        t.event_type = "member_join/invite".into();
        assert_eq!(t.category_parts(), ("member_join", Some("invite")));
    }

    #[test]
    fn older_record_fills_defaults() {
        let t: Trigger = serde_json::from_str(r#"{"event_type":"poke"}"#).unwrap();
        assert!(t.active);
        assert_eq!(t.priority, 50);
        assert!(t.block_following);
    }
}
