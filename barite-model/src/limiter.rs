use serde::{Deserialize, Serialize};

/// Calendar unit for the unit-time limiter. Buckets are calendar-aligned:
/// a `Day` limiter resets at midnight, not 24 hours after first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
}

/// Persisted description of a rule's admission precondition. The registry
/// builds the live limiter from this when the rule is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "limiter_type", rename_all = "snake_case")]
pub enum LimiterSpec {
    /// At most `max_usage` admissions per rolling window.
    Duration { duration_secs: u32, max_usage: u32 },
    /// At most `max_usage` admissions per calendar unit.
    UnitTime { unit: TimeUnit, max_usage: u32 },
}
