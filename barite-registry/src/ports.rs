//! Collaborator ports.
//!
//! The registry never talks to the network, renders a template, or
//! dispatches an event itself. Those concerns are injected through the
//! traits here; the registry only holds the opaque handles they return.

use barite_types::{InboundEvent, SendTarget};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a collaborator port.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// Template failure modes.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template syntax error: {0}")]
    Syntax(String),

    #[error("template execution error: {0}")]
    Execution(String),

    #[error("render exceeded its execution budget")]
    Timeout,
}

/// Opaque token for a registered matcher. The registry never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatcherHandle(u64);

impl MatcherHandle {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Opaque token for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

impl ScheduleHandle {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Predicate evaluated against every inbound event.
pub type Predicate = Arc<dyn Fn(&InboundEvent) -> bool + Send + Sync>;

/// Handler invoked when the predicate admits an event.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Task fired on a schedule tick.
pub type ScheduledTask = Arc<dyn Fn() + Send + Sync>;

/// Everything the dispatcher needs to install one matcher.
pub struct MatcherSpec {
    pub predicate: Predicate,
    pub priority: i32,
    pub block_following: bool,
    pub handler: EventHandler,
}

/// The host event dispatcher.
pub trait DispatcherPort: Send + Sync {
    fn register(&self, spec: MatcherSpec) -> Result<MatcherHandle, PortError>;
    fn unregister(&self, handle: MatcherHandle) -> Result<(), PortError>;
}

/// The host cron scheduler. `cancel` may be called from inside a running
/// task (one-shot jobs cancel themselves when they fire).
pub trait SchedulerPort: Send + Sync {
    fn schedule(&self, cron_spec: &str, task: ScheduledTask) -> Result<ScheduleHandle, PortError>;
    fn cancel(&self, handle: ScheduleHandle) -> Result<(), PortError>;
}

/// Data handed to the renderer alongside the template source.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// The raw inbound event, when rendering happens in a dispatch path.
    pub event: Option<serde_json::Value>,
}

/// The template/scripting engine, treated as an opaque function.
pub trait Renderer: Send + Sync {
    /// Syntax-only validation, run before a template is persisted.
    fn check(&self, source: &str) -> Result<(), RenderError>;

    /// Renders the template. May run attacker-influenced scripting content;
    /// callers go through [`render_with_budget`] rather than calling this
    /// directly from a dispatch path.
    fn render(&self, source: &str, context: &RenderContext) -> Result<String, RenderError>;
}

/// Outbound message delivery.
pub trait SendPort: Send + Sync {
    fn send(&self, target: SendTarget, text: &str);
}

/// Runs a render on a worker thread with a hard time budget. On timeout the
/// caller gets [`RenderError::Timeout`] and moves on; whatever the renderer
/// acquired is released when the worker eventually finishes and drops it.
pub fn render_with_budget(
    renderer: &Arc<dyn Renderer>,
    source: &str,
    context: RenderContext,
    budget: Duration,
) -> Result<String, RenderError> {
    let (tx, rx) = mpsc::channel();
    let renderer = Arc::clone(renderer);
    let source = source.to_string();
    thread::spawn(move || {
        let _ = tx.send(renderer.render(&source, &context));
    });
    match rx.recv_timeout(budget) {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout),
    }
}
