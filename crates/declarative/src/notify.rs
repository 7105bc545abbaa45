//! Notification edges and the delayed queue

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::resource::{Action, ResourceKey};

/// When a notification fires relative to the main resource list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Right after the notifying resource converges
    #[serde(alias = "immediate")]
    Immediately,
    /// Once, after every resource in the collection has been visited
    #[default]
    Delayed,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediately => "immediately",
            Self::Delayed => "delayed",
        })
    }
}

/// "When I converge, run `action` on `target`"
///
/// On a resource's `subscribes` list, `target` names the resource being
/// watched and `action` runs on the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub action: Action,
    #[serde(alias = "resource")]
    pub target: ResourceKey,
    #[serde(default)]
    pub timing: Timing,
}

impl Notification {
    pub fn new(action: Action, target: ResourceKey, timing: Timing) -> Self {
        Self {
            action,
            target,
            timing,
        }
    }
}

/// A delayed notification waiting for the end of the main list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub source: ResourceKey,
    pub target: ResourceKey,
    pub action: Action,
}

/// FIFO of delayed notifications, deduplicated by `(target, action)`
///
/// A pair fires at most once per run. Queueing a pair that is waiting or
/// has already been popped is a no-op, so delayed cycles drain.
#[derive(Debug, Default)]
pub struct DelayedQueue {
    queue: VecDeque<Pending>,
    waiting: HashSet<(ResourceKey, Action)>,
    fired: HashSet<(ResourceKey, Action)>,
}

impl DelayedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification; `false` when the pair is waiting or already fired
    pub fn push(&mut self, source: ResourceKey, target: ResourceKey, action: Action) -> bool {
        let pair = (target.clone(), action);
        if self.fired.contains(&pair) || !self.waiting.insert(pair) {
            return false;
        }
        self.queue.push_back(Pending {
            source,
            target,
            action,
        });
        true
    }

    pub fn pop(&mut self) -> Option<Pending> {
        let next = self.queue.pop_front()?;
        let pair = (next.target.clone(), next.action);
        self.waiting.remove(&pair);
        self.fired.insert(pair);
        Some(next)
    }

    /// Empty the queue without firing anything
    pub fn discard(&mut self) -> Vec<Pending> {
        self.waiting.clear();
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
