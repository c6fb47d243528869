//! Message-class bitmask.
//!
//! Each inbound message belongs to exactly one class; a rule carries a mask
//! of the classes it accepts. The bit assignments are part of the persisted
//! encoding and must not be reordered.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr};

/// A set of message classes, stored as a `u32` bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageMask(pub u32);

impl MessageMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0xffff_ffff);

    pub const FRIEND: Self = Self(1 << 0);
    pub const GROUP_TEMP: Self = Self(1 << 1);
    pub const OTHER_TEMP: Self = Self(1 << 2);
    pub const OFFICIAL: Self = Self(1 << 3);
    pub const GROUP_NORMAL: Self = Self(1 << 4);
    pub const GROUP_ANONYMOUS: Self = Self(1 << 5);
    pub const GROUP_NOTICE: Self = Self(1 << 6);
    pub const DISCUSS: Self = Self(1 << 7);

    /// All direct-message classes.
    pub const PRIVATE: Self =
        Self(Self::FRIEND.0 | Self::GROUP_TEMP.0 | Self::OTHER_TEMP.0);
    /// All group-channel classes.
    pub const GROUP: Self =
        Self(Self::GROUP_NORMAL.0 | Self::GROUP_ANONYMOUS.0 | Self::GROUP_NOTICE.0);

    /// True if any class in `other` is present in this mask.
    #[must_use]
    pub const fn accepts(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Resolves a channel label from the host event bus to its class set.
    /// Returns `None` for labels this registry does not know.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "group" => Some(Self::GROUP),
            "private" => Some(Self::PRIVATE),
            "discuss" => Some(Self::DISCUSS),
            "official" => Some(Self::OFFICIAL),
            _ => None,
        }
    }
}

impl Default for MessageMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for MessageMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for MessageMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}
