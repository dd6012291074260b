//! Deferred cross-reference resolution.
//!
//! Two independent mechanisms, both needed during decode:
//!
//! 1. [`Resolver`] — a map of target reference ID to waiting continuations.
//!    A consumer that needs a value produced elsewhere in the walk
//!    registers a continuation against the producer's ID; every node, as
//!    soon as it finishes producing its value, delivers it and any waiting
//!    continuations run synchronously inside the same walk. Delivered
//!    values are cached so a consumer that registers after its producer
//!    still resolves.
//! 2. [`PostPass`] — an ordered queue of deferred actions for steps that
//!    need the whole tree materialized first (forward references across
//!    sibling subtrees, lookups by name). Actions run exactly once, in
//!    registration order, after the walk completes. There is only one
//!    pass: an action that depends on another action's effect must be
//!    registered after it.
//!
//! Dangling targets are silent by design — a continuation whose target ID
//! never resolves is simply never invoked. The decode report surfaces the
//! count so callers can validate at the boundary.

use std::collections::HashMap;

use crate::codec::value::Value;
use crate::id::ReferenceId;

/// A waiting consumer: invoked with the resolved value when its target ID
/// is delivered.
pub type Continuation = Box<dyn FnOnce(&Value)>;

/// Routes resolved values to the consumers that requested them by ID.
#[derive(Default)]
pub struct Resolver {
    pending: HashMap<u32, Vec<Continuation>>,
    delivered: HashMap<u32, Value>,
}

impl Resolver {
    /// Creates an empty resolver for one decode session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a continuation against `target`.
    ///
    /// If the target already resolved earlier in the walk, the
    /// continuation runs immediately; otherwise it waits until delivery.
    pub fn expect(&mut self, target: ReferenceId, continuation: Continuation) {
        if let Some(value) = self.delivered.get(&target.as_u32()) {
            continuation(value);
            return;
        }
        self.pending
            .entry(target.as_u32())
            .or_default()
            .push(continuation);
    }

    /// Delivers a freshly produced value, running every continuation that
    /// targeted `id`.
    pub fn deliver(&mut self, id: ReferenceId, value: Value) {
        if let Some(waiting) = self.pending.remove(&id.as_u32()) {
            for continuation in waiting {
                continuation(&value);
            }
        }
        self.delivered.insert(id.as_u32(), value);
    }

    /// Looks up an already-delivered value.
    pub fn delivered(&self, id: ReferenceId) -> Option<&Value> {
        self.delivered.get(&id.as_u32())
    }

    /// Number of targets that never resolved.
    pub fn dangling(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("pending_targets", &self.pending.len())
            .field("delivered", &self.delivered.len())
            .finish()
    }
}

/// A deferred reconstruction step run once after the full tree is built.
pub type PostPassAction<T> = Box<dyn FnOnce(&T)>;

/// Append-only queue of post-pass actions, drained exactly once.
pub struct PostPass<T> {
    actions: Vec<PostPassAction<T>>,
}

impl<T> PostPass<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Appends an action; order of registration is order of execution.
    pub fn defer(&mut self, action: PostPassAction<T>) {
        self.actions.push(action);
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Consumes the queue, running every action in registration order.
    pub fn run(self, root: &T) {
        for action in self.actions {
            action(root);
        }
    }
}

impl<T> Default for PostPass<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PostPass<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostPass")
            .field("queued", &self.actions.len())
            .finish()
    }
}
