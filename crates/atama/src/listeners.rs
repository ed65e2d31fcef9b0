//! Listener registry and dispatcher.
//!
//! Subscriptions are kept in registration order. A dispatch pass snapshots
//! the matching subscriptions first and releases the registry lock before
//! calling anyone, so a callback may unsubscribe itself or others mid-pass.
//! A subscription removed during a pass is not called for the rest of it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::error;

use crate::node::Node;
use crate::stack::ChangeStack;

pub type Callback = Box<dyn FnMut(&Value, &ChangeStack) + Send>;

type SharedCallback = Arc<Mutex<Callback>>;

struct Listener {
    id: u64,
    path: Option<String>,
    callback: SharedCallback,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl RegistryInner {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }
}

/// Handle returned by subscribing. Unsubscribing is idempotent; dropping the
/// handle leaves the subscription in place.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    path: Option<String>,
    registry: Weak<Mutex<RegistryInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Remove the subscription. Returns whether this call removed it.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => inner.lock().remove(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.lock().contains(self.id))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

/// Whether a subscription at `path` cares about a change at `change_key`.
///
/// Root subscriptions match everything. Otherwise the change must sit at the
/// path, under it, or above it (an ancestor was replaced).
pub fn path_matches(path: Option<&str>, change_key: &str) -> bool {
    match path {
        None => true,
        Some(path) => atama_path::keys_overlap(change_key, path),
    }
}

struct Active {
    id: u64,
    path: Option<String>,
    callback: SharedCallback,
}

#[derive(Clone, Default)]
pub(crate) struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub(crate) fn subscribe(&self, path: Option<&str>, callback: Callback) -> Subscription {
        let path = path.filter(|p| !p.is_empty()).map(str::to_string);
        let mut inner = self.inner.lock();
        inner.next_id = inner.next_id.saturating_add(1);
        let id = inner.next_id;
        inner.listeners.push(Listener {
            id,
            path: path.clone(),
            callback: Arc::new(Mutex::new(callback)),
        });
        Subscription {
            id,
            path,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    fn snapshot(&self) -> Vec<Active> {
        self.inner
            .lock()
            .listeners
            .iter()
            .map(|l| Active {
                id: l.id,
                path: l.path.clone(),
                callback: Arc::clone(&l.callback),
            })
            .collect()
    }

    fn is_active(&self, id: u64) -> bool {
        self.inner.lock().contains(id)
    }

    /// Notify every matching subscription once for a single change.
    /// Returns the number of callbacks that completed.
    pub(crate) fn dispatch(&self, root: &Node, stack: &ChangeStack) -> usize {
        let key = stack.key();
        let matching: Vec<Active> = self
            .snapshot()
            .into_iter()
            .filter(|active| path_matches(active.path.as_deref(), &key))
            .collect();
        if matching.is_empty() {
            return 0;
        }
        let mut payloads = Payloads::new(root);
        let mut notified = 0;
        for active in &matching {
            if !self.is_active(active.id) {
                continue;
            }
            if notify(active, payloads.resolve(active.path.as_deref()), stack) {
                notified += 1;
            }
        }
        notified
    }

    /// Notify every subscription matching at least one of `pending` exactly
    /// once, handing it the last change it matched.
    pub(crate) fn flush(&self, root: &Node, pending: &[ChangeStack]) -> usize {
        let keys: Vec<String> = pending.iter().map(ChangeStack::key).collect();
        let matching: Vec<(Active, usize)> = self
            .snapshot()
            .into_iter()
            .filter_map(|active| {
                let last = keys
                    .iter()
                    .rposition(|key| path_matches(active.path.as_deref(), key))?;
                Some((active, last))
            })
            .collect();
        let mut payloads = Payloads::new(root);
        let mut notified = 0;
        for (active, index) in &matching {
            if !self.is_active(active.id) {
                continue;
            }
            if notify(active, payloads.resolve(active.path.as_deref()), &pending[*index]) {
                notified += 1;
            }
        }
        notified
    }
}

/// Values handed to callbacks during one pass, built on first use. Scoped
/// subscriptions only materialize their own subtree.
struct Payloads<'a> {
    root: &'a Node,
    built: HashMap<Option<String>, Value>,
}

impl<'a> Payloads<'a> {
    fn new(root: &'a Node) -> Self {
        Self {
            root,
            built: HashMap::new(),
        }
    }

    fn resolve(&mut self, path: Option<&str>) -> &Value {
        let root = self.root;
        self.built
            .entry(path.map(str::to_string))
            .or_insert_with(|| match path {
                None => root.to_value(),
                Some(path) => root.find_key(path).map_or(Value::Null, Node::to_value),
            })
    }
}

fn notify(active: &Active, value: &Value, stack: &ChangeStack) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut callback = active.callback.lock();
        (*callback)(value, stack);
    }));
    if outcome.is_err() {
        error!(
            subscription = active.id,
            path = active.path.as_deref().unwrap_or(""),
            key = %stack.key(),
            "listener panicked during dispatch"
        );
        return false;
    }
    true
}
