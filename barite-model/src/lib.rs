//! Entity model types for barite.
//!
//! Every stored configuration record is one of five kinds: `Rule`,
//! `Trigger`, `Job`, `Resource`, or `Group`. The structs here are plain
//! serde data with no I/O; persistence and live registration live in the
//! storage and registry crates.
//!
//! All optional fields carry `#[serde(default = …)]` so a record written by
//! an older build decodes with its documented default instead of failing.

mod group;
mod job;
mod limiter;
mod resource;
mod rule;
mod trigger;

pub use group::{Group, GroupItem};
pub use job::{Job, Recipients};
pub use limiter::{LimiterSpec, TimeUnit};
pub use resource::Resource;
pub use rule::{MatcherKind, Rule};
pub use trigger::Trigger;

/// Common accessors shared by every kind that can sit in a group's item
/// list. The group hierarchy uses these to keep denormalized display names
/// and parent pointers consistent without knowing the concrete kind.
pub trait GroupMember {
    /// Name shown in the parent group's item list.
    fn display_name(&self) -> String;

    /// The owning group.
    fn parent_group(&self) -> u64;

    /// Rewrites the parent pointer (the caller persists the record).
    fn set_parent(&mut self, parent: u64);
}
