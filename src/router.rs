//! Next-step selection shared by every step of a graph.
//!
//! Routing is centralized: steps only annotate the state with a [`Next`]
//! value, and the graph's single [`Router`] decides what actually runs.

use crate::state::WorkflowState;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::warn;

/// Terminal sentinel as stored in the `next` field.
pub const END: &str = "__end__";

/// Where a run goes after a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Next {
    /// Run the named step.
    Step(String),
    /// Stop and hand the state back to the caller.
    Terminal,
}

impl Next {
    pub fn step(name: impl Into<String>) -> Self {
        Next::Step(name.into())
    }

    /// Parse the stored form; [`END`] maps to [`Next::Terminal`].
    pub fn parse(raw: &str) -> Self {
        if raw == END {
            Next::Terminal
        } else {
            Next::Step(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Next::Step(name) => name,
            Next::Terminal => END,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Next::Terminal)
    }
}

impl fmt::Display for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless routing policy for one graph.
///
/// Decision order:
/// 1. `error` present → [`Next::Terminal`], whatever `next` says.
/// 2. `next` names a registered step → that step.
/// 3. `next` is the terminal sentinel or names an unknown step → terminal.
/// 4. `next` absent → the current step's default edge, or terminal.
#[derive(Debug, Clone, Default)]
pub struct Router {
    steps: HashSet<String>,
    edges: HashMap<String, String>,
}

impl Router {
    pub(crate) fn new(steps: HashSet<String>, edges: HashMap<String, String>) -> Self {
        Self { steps, edges }
    }

    /// Whether `name` is a registered step of this graph.
    pub fn knows(&self, name: &str) -> bool {
        self.steps.contains(name)
    }

    /// Default successor of `step`, if one was wired with an edge.
    pub fn default_edge(&self, step: &str) -> Option<&str> {
        self.edges.get(step).map(String::as_str)
    }

    /// Select the step to run after `current` produced `state`.
    pub fn route(&self, current: &str, state: &WorkflowState) -> Next {
        if state.has_error() {
            return Next::Terminal;
        }

        match state.next() {
            Some(Next::Terminal) => Next::Terminal,
            Some(Next::Step(name)) if self.knows(&name) => Next::Step(name),
            Some(Next::Step(name)) => {
                warn!(step = current, next = %name, "next names an unregistered step, ending run");
                Next::Terminal
            }
            None => match self.default_edge(current) {
                Some(to) => Next::parse(to),
                None => Next::Terminal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepFailure;

    fn router() -> Router {
        let steps = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let edges = [("a".to_string(), "c".to_string())].into_iter().collect();
        Router::new(steps, edges)
    }

    #[test]
    fn error_short_circuits_any_next() {
        let r = router();
        for next in [Next::step("b"), Next::step("zzz"), Next::Terminal] {
            let state = WorkflowState::new()
                .fail(&StepFailure::Transport("down".into()))
                .with("next", next.as_str().to_string());
            assert_eq!(r.route("a", &state), Next::Terminal);
        }
    }

    #[test]
    fn explicit_next_wins_over_edge() {
        let state = WorkflowState::new().with_next(Next::step("b"));
        assert_eq!(router().route("a", &state), Next::step("b"));
    }

    #[test]
    fn absent_next_follows_default_edge() {
        let r = router();
        assert_eq!(r.route("a", &WorkflowState::new()), Next::step("c"));
        assert_eq!(r.route("b", &WorkflowState::new()), Next::Terminal);
    }

    #[test]
    fn unknown_or_terminal_next_ends_run() {
        let r = router();
        let unknown = WorkflowState::new().with_next(Next::step("missing"));
        assert_eq!(r.route("a", &unknown), Next::Terminal);

        let done = WorkflowState::new().with_next(Next::Terminal);
        assert_eq!(r.route("a", &done), Next::Terminal);
    }

    #[test]
    fn sentinel_parses_to_terminal() {
        assert_eq!(Next::parse(END), Next::Terminal);
        assert_eq!(Next::parse("x"), Next::step("x"));
        assert_eq!(Next::Terminal.to_string(), "__end__");
    }
}
