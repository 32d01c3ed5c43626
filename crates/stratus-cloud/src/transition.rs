//! Target-state transition driver
//!
//! Some resources expose a status the user can set (a sync job that is
//! running or paused). Reaching a declared status may take several actions
//! in sequence, e.g. a job that was never started must be started before it
//! can be suspended. The edges are declared once per resource in a
//! [`TransitionTable`]; [`drive_to_state`] finds the shortest path and walks it.

use crate::error::{CloudError, Result};
use crate::wait::{Describe, Stateful, WaitSpec, wait_for_state};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Where an edge may be taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSource {
    Any,
    From(&'static str),
}

/// One action that moves an entity into `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: EdgeSource,
    pub to: &'static str,
    pub action: &'static str,
    /// Wait before the first describe after firing.
    pub delay: Duration,
    pub interval: Duration,
}

impl Edge {
    pub fn new(from: EdgeSource, to: &'static str, action: &'static str) -> Self {
        Self {
            from,
            to,
            action,
            delay: Duration::ZERO,
            interval: Duration::from_secs(5),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn leaves(&self, state: &str) -> bool {
        match self.from {
            EdgeSource::Any => self.to != state,
            EdgeSource::From(from) => from == state,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    pub edges: Vec<Edge>,
    pub failure_states: Vec<&'static str>,
}

impl TransitionTable {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self {
            edges,
            failure_states: Vec::new(),
        }
    }

    pub fn with_failure_states(mut self, states: &[&'static str]) -> Self {
        self.failure_states = states.to_vec();
        self
    }

    /// Whether any edge ends in `target`.
    pub fn is_reachable(&self, target: &str) -> bool {
        self.edges.iter().any(|e| e.to == target)
    }

    /// Shortest sequence of edges from `current` to `target`.
    ///
    /// Empty when `current == target`, `None` when no path exists.
    pub fn path(&self, current: &str, target: &str) -> Option<Vec<&Edge>> {
        if current == target {
            return Some(Vec::new());
        }

        let mut came_from: HashMap<&str, (&str, &Edge)> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::from([current]);

        while let Some(state) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| e.leaves(state)) {
                if edge.to == current || came_from.contains_key(edge.to) {
                    continue;
                }
                came_from.insert(edge.to, (state, edge));
                if edge.to == target {
                    let mut path = Vec::new();
                    let mut cursor = target;
                    while let Some((prev, edge)) = came_from.get(cursor) {
                        path.push(*edge);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(edge.to);
            }
        }
        None
    }
}

/// A resource whose status is driven through a [`TransitionTable`].
#[async_trait]
pub trait Transitions<S: Stateful + Send>: Describe<S> {
    fn table(&self) -> &TransitionTable;

    /// Submit the mutating call for `edge`. Retrying is the implementor's job.
    async fn fire(&self, id: &str, edge: &Edge) -> Result<()>;
}

/// Walk `id` to `target`, waiting for each intermediate state.
///
/// Unreachable targets are rejected before any remote call.
pub async fn drive_to_state<S, M>(machine: &M, id: &str, target: &str, timeout: Duration) -> Result<()>
where
    S: Stateful + Send,
    M: Transitions<S> + ?Sized,
{
    let table = machine.table();
    if !table.is_reachable(target) {
        return Err(CloudError::UnreachableState {
            from: None,
            to: target.to_string(),
        });
    }

    let current = machine.describe(id).await?;
    let current = current.status().to_string();
    if current == target {
        tracing::debug!(id, status = %current, "already in target state");
        return Ok(());
    }

    let path = table.path(&current, target).ok_or_else(|| CloudError::UnreachableState {
        from: Some(current.clone()),
        to: target.to_string(),
    })?;

    tracing::info!(
        id,
        from = %current,
        to = target,
        steps = ?path.iter().map(|e| e.action).collect::<Vec<_>>(),
        "driving state"
    );

    for edge in path {
        machine.fire(id, edge).await?;
        let spec = WaitSpec::new([edge.to], timeout)
            .failures(table.failure_states.iter().copied())
            .delay(edge.delay)
            .interval(edge.interval);
        wait_for_state(machine, id, &spec)
            .await
            .map_err(|e| e.annotate(edge.action, id))?;
    }
    Ok(())
}
