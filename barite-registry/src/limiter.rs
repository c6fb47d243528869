//! Admission-control limiters usable as a rule precondition.
//!
//! Two interchangeable algorithms, both exposing `require()` (true = admit
//! and record the attempt). State persists under the owning rule's ID so
//! limits survive restart, and is loaded lazily when the rule is
//! registered, not eagerly for every rule.

use barite_model::{LimiterSpec, TimeUnit};
use barite_storage::{id_to_bytes, KeyValueStore};
use chrono::{DateTime, Datelike, Local, Timelike};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

const DURATION_PREFIX: &[u8] = b"limiters-duration-";
const UNIT_PREFIX: &[u8] = b"limiters-unit-";

/// Shared interface of both algorithms.
pub trait RateLimiter: Send + Sync {
    /// True admits the call and records the attempt; false rejects it.
    fn require(&self) -> bool;
}

/// Builds the live limiter for a rule, loading any persisted state.
pub fn build_limiter(kv: &KeyValueStore, rule_id: u64, spec: &LimiterSpec) -> Box<dyn RateLimiter> {
    match spec {
        LimiterSpec::Duration {
            duration_secs,
            max_usage,
        } => Box::new(DurationLimiter::load(
            kv.clone(),
            rule_id,
            *duration_secs,
            (*max_usage).max(1),
        )),
        LimiterSpec::UnitTime { unit, max_usage } => Box::new(UnitTimeLimiter::load(
            kv.clone(),
            rule_id,
            *unit,
            (*max_usage).max(1),
        )),
    }
}

/// Removes any persisted limiter state for a rule being deleted.
pub fn delete_limiter_state(kv: &KeyValueStore, rule_id: u64) {
    for prefix in [DURATION_PREFIX, UNIT_PREFIX] {
        let mut key = prefix.to_vec();
        key.extend_from_slice(&id_to_bytes(rule_id));
        if let Err(err) = kv.delete(&key) {
            warn!(rule_id, %err, "failed to delete limiter state");
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

// ── Duration limiter ─────────────────────────────────────────────

struct DurationState {
    /// Index of the oldest admission's slot.
    cursor: u32,
    /// Expiry instants (nanos since epoch), all zero until used.
    slots: Vec<i64>,
}

/// "At most `max_usage` admissions per rolling window", in O(1) memory: a
/// circular buffer of expiry timestamps whose cursor always points at the
/// oldest admission.
pub struct DurationLimiter {
    kv: KeyValueStore,
    key: Vec<u8>,
    window_nanos: i64,
    max_usage: u32,
    state: Mutex<DurationState>,
}

impl DurationLimiter {
    fn load(kv: KeyValueStore, rule_id: u64, duration_secs: u32, max_usage: u32) -> Self {
        let mut key = DURATION_PREFIX.to_vec();
        key.extend_from_slice(&id_to_bytes(rule_id));
        let state = match kv.get(&key) {
            Ok(Some(bytes)) => decode_duration_state(&bytes, max_usage),
            Ok(None) => None,
            Err(err) => {
                warn!(rule_id, %err, "failed to load duration limiter state");
                None
            }
        }
        .unwrap_or(DurationState {
            cursor: 0,
            slots: vec![0; max_usage as usize],
        });
        Self {
            kv,
            key,
            window_nanos: i64::from(duration_secs) * 1_000_000_000,
            max_usage,
            state: Mutex::new(state),
        }
    }

    fn persist(&self, state: &DurationState) {
        let mut bytes = state.cursor.to_le_bytes().to_vec();
        for slot in &state.slots {
            bytes.extend_from_slice(&slot.to_le_bytes());
        }
        if let Err(err) = self.kv.put(&self.key, &bytes) {
            warn!(%err, "failed to persist duration limiter state");
        }
    }
}

/// Rejects persisted state whose slot count no longer matches `max_usage`
/// (the rule's limiter spec was edited).
fn decode_duration_state(bytes: &[u8], max_usage: u32) -> Option<DurationState> {
    if bytes.len() != 4 + max_usage as usize * 8 {
        return None;
    }
    let cursor = u32::from_le_bytes(bytes[..4].try_into().ok()?) % max_usage;
    let slots = bytes[4..]
        .chunks_exact(8)
        .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Some(DurationState { cursor, slots })
}

impl RateLimiter for DurationLimiter {
    fn require(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = now_nanos();
        let oldest = state.slots[state.cursor as usize];
        if now > oldest {
            let cursor = state.cursor;
            state.slots[cursor as usize] = now + self.window_nanos;
            state.cursor = (cursor + 1) % self.max_usage;
            self.persist(&state);
            true
        } else {
            false
        }
    }
}

// ── Unit-time limiter ────────────────────────────────────────────

struct UnitState {
    bucket: u32,
    usage: u32,
}

/// "At most `max_usage` admissions per calendar unit." Buckets are packed
/// calendar integers, so they compare by equality and reset on calendar
/// boundaries (a day limiter resets at midnight, not 24h after first use).
pub struct UnitTimeLimiter {
    kv: KeyValueStore,
    key: Vec<u8>,
    unit: TimeUnit,
    max_usage: u32,
    state: Mutex<UnitState>,
}

impl UnitTimeLimiter {
    fn load(kv: KeyValueStore, rule_id: u64, unit: TimeUnit, max_usage: u32) -> Self {
        let mut key = UNIT_PREFIX.to_vec();
        key.extend_from_slice(&id_to_bytes(rule_id));
        let state = match kv.get(&key) {
            Ok(Some(bytes)) if bytes.len() == 8 => UnitState {
                bucket: u32::from_le_bytes(bytes[..4].try_into().unwrap()),
                usage: u32::from_le_bytes(bytes[4..].try_into().unwrap()),
            },
            Ok(_) => UnitState { bucket: 0, usage: 0 },
            Err(err) => {
                warn!(rule_id, %err, "failed to load unit limiter state");
                UnitState { bucket: 0, usage: 0 }
            }
        };
        Self {
            kv,
            key,
            unit,
            max_usage,
            state: Mutex::new(state),
        }
    }

    fn persist(&self, state: &UnitState) {
        let mut bytes = state.bucket.to_le_bytes().to_vec();
        bytes.extend_from_slice(&state.usage.to_le_bytes());
        if let Err(err) = self.kv.put(&self.key, &bytes) {
            warn!(%err, "failed to persist unit limiter state");
        }
    }

    fn require_at(&self, bucket: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        let admitted = if bucket == state.bucket {
            if state.usage < self.max_usage {
                state.usage += 1;
                true
            } else {
                false
            }
        } else {
            state.bucket = bucket;
            state.usage = 1;
            true
        };
        if admitted {
            self.persist(&state);
        }
        admitted
    }
}

impl RateLimiter for UnitTimeLimiter {
    fn require(&self) -> bool {
        self.require_at(bucket_for(self.unit, Local::now()))
    }
}

// Packed bucket layout (bit positions):
//   year: last 4 bits, 20–23
//   week: 1–54, 6 bits, 14–19
//   month: 1–12, 4 bits, 10–13
//   day: 1–31, 5 bits, 5–9
//   hour: 0–23, 5 bits, 0–4
fn bucket_for(unit: TimeUnit, now: DateTime<Local>) -> u32 {
    let year = (now.year() as u32) & 0xf;
    match unit {
        TimeUnit::Month => (year << 20) | (now.month() << 10),
        TimeUnit::Day => (year << 20) | (now.month() << 10) | (now.day() << 5),
        TimeUnit::Hour => (year << 20) | (now.month() << 10) | (now.day() << 5) | now.hour(),
        TimeUnit::Week => {
            let iso = now.iso_week();
            (((iso.year() as u32) & 0xf) << 20) | (iso.week() << 14)
        }
    }
}
