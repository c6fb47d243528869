use crate::{GroupMember, LimiterSpec};
use barite_types::MessageMask;
use serde::{Deserialize, Serialize};

/// How a rule's patterns are matched against message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    FullMatch,
    Keyword,
    Prefix,
    Suffix,
    Command,
    Regex,
}

impl Default for MatcherKind {
    fn default() -> Self {
        Self::FullMatch
    }
}

/// A pattern→template binding evaluated against inbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub display_name: String,
    /// Inactive rules are stored but never registered.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Channel classes this rule listens on.
    #[serde(default)]
    pub message_types: MessageMask,
    /// Group allow-list; empty means any group.
    #[serde(default)]
    pub group_filter: Vec<i64>,
    /// User allow-list; empty means any user.
    #[serde(default)]
    pub user_filter: Vec<i64>,
    #[serde(default)]
    pub matcher_kind: MatcherKind,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Match only when the message explicitly addresses the responder.
    #[serde(default)]
    pub only_when_addressed: bool,
    #[serde(default)]
    pub response_template: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Stop evaluating lower-priority matchers after this one fires.
    #[serde(default = "default_block")]
    pub block_following: bool,
    /// Optional admission precondition; state persists under this rule's ID.
    #[serde(default)]
    pub rate_limit: Option<LimiterSpec>,
    #[serde(default)]
    pub parent_group: u64,
}

pub(crate) fn default_active() -> bool {
    true
}

pub(crate) fn default_priority() -> i32 {
    50
}

pub(crate) fn default_block() -> bool {
    true
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            active: true,
            message_types: MessageMask::ALL,
            group_filter: Vec::new(),
            user_filter: Vec::new(),
            matcher_kind: MatcherKind::FullMatch,
            patterns: Vec::new(),
            only_when_addressed: false,
            response_template: String::new(),
            priority: 50,
            block_following: true,
            rate_limit: None,
            parent_group: 0,
        }
    }
}

impl GroupMember for Rule {
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
