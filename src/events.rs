//! Run lifecycle hooks.
//!
//! Graphs and steps emit [`Event`]s to an optional [`EventHandler`] on the
//! [`ExecCtx`](crate::ExecCtx). Handlers run synchronously on the task
//! executing the run, so keep them cheap.

use std::sync::Arc;

/// Events emitted while a graph runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A run has started at the graph's entry step.
    RunStart {
        graph: String,
        run_id: String,
    },
    /// A step is about to execute.
    StepStart {
        run_id: String,
        step: String,
    },
    /// A step returned. `ok` is false when it set the `error` field.
    StepEnd {
        run_id: String,
        step: String,
        ok: bool,
    },
    /// A structured call is re-prompting after an unparseable reply.
    RetryStart {
        step: String,
        /// 1-indexed re-prompt number.
        attempt: u32,
    },
    /// A transport-level retry after an HTTP or connection error.
    TransportRetry {
        step: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// A run has ended.
    RunEnd {
        graph: String,
        run_id: String,
        steps: usize,
        error: Option<String>,
    },
}

/// Receiver for run lifecycle events.
///
/// # Example
///
/// ```
/// use forge_agents::events::{Event, EventHandler};
///
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: Event) {
///         if let Event::StepEnd { step, ok, .. } = event {
///             println!("{step}: {}", if ok { "done" } else { "failed" });
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
