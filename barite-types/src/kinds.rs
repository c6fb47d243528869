use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five kinds of stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Rule,
    Trigger,
    Job,
    Resource,
    Group,
}

impl ItemKind {
    /// Stable string form, used in item lists and bundle manifests.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Trigger => "trigger",
            Self::Job => "job",
            Self::Resource => "resource",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized item-kind string.
#[derive(Debug, thiserror::Error)]
#[error("unknown item kind: {0}")]
pub struct UnknownItemKind(String);

impl FromStr for ItemKind {
    type Err = UnknownItemKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(Self::Rule),
            "trigger" => Ok(Self::Trigger),
            "job" => Ok(Self::Job),
            "resource" => Ok(Self::Resource),
            "group" => Ok(Self::Group),
            other => Err(UnknownItemKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_strings() {
        for kind in [
            ItemKind::Rule,
            ItemKind::Trigger,
            ItemKind::Job,
            ItemKind::Resource,
            ItemKind::Group,
        ] {
            assert_eq!(kind.as_str().parse::<ItemKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!("widget".parse::<ItemKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ItemKind::Resource).unwrap();
        assert_eq!(json, r#""resource""#);
    }
}
