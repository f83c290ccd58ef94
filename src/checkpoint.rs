//! Per-step state snapshots.
//!
//! A graph with a [`Checkpointer`] saves the state after every step, keyed
//! by run id. Snapshots are for inspection and debugging; runs are not
//! resumed from them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::state::WorkflowState;

/// The state right after one step finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub run_id: String,
    /// 0-based position of the step within the run.
    pub sequence: usize,
    pub step: String,
    pub state: WorkflowState,
}

/// Storage for checkpoints. Implementations must be safe to share across
/// concurrent runs.
pub trait Checkpointer: Send + Sync {
    fn save(&self, checkpoint: Checkpoint);

    /// Every checkpoint of `run_id`, oldest first.
    fn history(&self, run_id: &str) -> Vec<Checkpoint>;

    fn latest(&self, run_id: &str) -> Option<Checkpoint> {
        self.history(run_id).pop()
    }
}

/// In-process checkpointer backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    runs: Mutex<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run ids with at least one checkpoint.
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Checkpoint>>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn save(&self, checkpoint: Checkpoint) {
        self.lock()
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint);
    }

    fn history(&self, run_id: &str) -> Vec<Checkpoint> {
        self.lock().get(run_id).cloned().unwrap_or_default()
    }
}
