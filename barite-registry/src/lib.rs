//! Live configuration registry for barite.
//!
//! This crate ties the stored configuration to the running system: every
//! active rule, trigger, and job in the store has exactly one live
//! registration with the host dispatcher or scheduler, and every CRUD
//! operation keeps store, in-memory mirror, and live registrations in
//! step.
//!
//! # Architecture
//!
//! - [`Registry`] is the single entry point; clones share one state
//! - Collaborators (dispatcher, scheduler, renderer, sender) are injected
//!   as trait objects through [`Ports`]
//! - Matcher predicates capture immutable snapshots of their rule, so the
//!   dispatch path never takes a registry lock
//! - Template renders run under a hard time budget

mod archive;
mod error;
mod hierarchy;
mod jobs;
mod limiter;
mod ports;
mod registry;
mod resources;
mod rules;
mod triggers;

pub use error::{RegistryError, RegistryResult};
pub use limiter::{build_limiter, DurationLimiter, RateLimiter, UnitTimeLimiter};
pub use ports::{
    render_with_budget, DispatcherPort, EventHandler, MatcherHandle, MatcherSpec, PortError,
    Predicate, RenderContext, RenderError, Renderer, ScheduleHandle, ScheduledTask, SchedulerPort,
    SendPort,
};
pub use registry::{Ports, Registry, RegistryConfig};
