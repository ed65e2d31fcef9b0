use std::panic::{self, AssertUnwindSafe};

use atama_path::format_path;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, trace};

use crate::batch::Batch;
use crate::error::EngineError;
use crate::handles::NodeHandle;
use crate::history::{EventKind, History, NewEntry};
use crate::listeners::{Registry, Subscription};
use crate::node::{parse_index, ContainerKind, Node, WrapperId, WrapperIds, MAX_SEQUENCE_PADDING};
use crate::options::EngineOptions;
use crate::persist::Persistence;
use crate::stack::{AncestorStep, ChangeStack};

/// One independent reactive store: a root mapping plus its own listener
/// registry, history log and optional persistence backend.
pub struct Engine {
    root: Node,
    ids: WrapperIds,
    history: Mutex<History>,
    registry: Registry,
    batch: Batch,
    options: EngineOptions,
    persistence: Option<Box<dyn Persistence>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let mut ids = WrapperIds::default();
        let root = Node::empty_mapping(&mut ids);
        let history = History::new(options.history_limit()).with_traces(options.traces);
        Self {
            root,
            ids,
            history: Mutex::new(history),
            registry: Registry::default(),
            batch: Batch::default(),
            options,
            persistence: None,
        }
    }

    /// Build an engine whose top-level keys are loaded from `store`. Every
    /// later change is saved back to it.
    pub fn with_persistence(
        options: EngineOptions,
        mut store: impl Persistence + 'static,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::with_options(options);
        if let Some(data) = store.load()? {
            let keys = data.len();
            for (key, value) in data {
                engine.set_path(&[key], value)?;
            }
            debug!(keys, "loaded persisted state");
        }
        engine.persistence = Some(Box::new(store));
        Ok(engine)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The instrumented view of the root.
    pub fn attach_root(&mut self) -> NodeHandle<'_> {
        NodeHandle::new(self, Vec::new())
    }

    /// Shortcut for `attach_root().at(key)`.
    pub fn at(&mut self, key: &str) -> NodeHandle<'_> {
        NodeHandle::new(self, atama_path::parse_path(key))
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Plain JSON copy of the whole tree.
    pub fn view(&self) -> Value {
        self.root.to_value()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_path(&atama_path::parse_path(key))
    }

    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<Value> {
        let value = self.root.find(path).map(Node::to_value);
        if self.options.log_reads && !path.is_empty() {
            let mut entry = NewEntry::new(EventKind::Read, format_path(path));
            if let Some(value) = &value {
                entry = entry.with_value(value.clone());
            }
            self.history.lock().add(entry);
        }
        value
    }

    /// Set the value at a dotted key. Returns `Ok(false)` when the stored
    /// value already equals `value`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<bool, EngineError> {
        atama_path::validate_key(key)?;
        self.set_path(&atama_path::parse_path(key), value.into())
    }

    pub fn set_path<S: AsRef<str>>(
        &mut self,
        path: &[S],
        value: Value,
    ) -> Result<bool, EngineError> {
        let (leaf, parents) = path.split_last().ok_or(EngineError::EmptyPath)?;
        let leaf = leaf.as_ref();
        atama_path::validate_path(path)?;
        self.check_reserved(leaf)?;
        let key = format_path(path);

        let mut steps = Vec::with_capacity(path.len());
        let parent = descend(&mut self.root, parents, &mut steps)?;
        let (container, kind, index) = container_of(parent, parents, leaf)?;
        if index.is_some_and(|index| index.saturating_sub(parent.len()) > MAX_SEQUENCE_PADDING) {
            return Err(invalid_index(parents, leaf));
        }
        let event = match parent.child(leaf) {
            Some(current) if current.equals_value(&value) => {
                trace!(key = %key, "value unchanged");
                return Ok(false);
            }
            Some(_) => EventKind::Update,
            None => EventKind::Create,
        };
        let previous = parent.child(leaf).map(Node::to_value);
        if !parent.assign(leaf, Node::wrap(value.clone(), &mut self.ids)) {
            return Err(invalid_index(parents, leaf));
        }

        steps.push(AncestorStep {
            container,
            kind,
            property: leaf.to_string(),
            previous,
            value: Some(value.clone()),
        });
        self.history
            .lock()
            .add(NewEntry::new(event, key).with_value(value));
        self.changed(ChangeStack::new(steps));
        Ok(true)
    }

    /// Delete the value at a dotted key. Sequences close the gap. Returns
    /// `Ok(false)` when there was nothing to delete.
    pub fn remove(&mut self, key: &str) -> Result<bool, EngineError> {
        atama_path::validate_key(key)?;
        self.remove_path(&atama_path::parse_path(key))
    }

    pub fn remove_path<S: AsRef<str>>(&mut self, path: &[S]) -> Result<bool, EngineError> {
        let (leaf, parents) = path.split_last().ok_or(EngineError::EmptyPath)?;
        let leaf = leaf.as_ref();
        atama_path::validate_path(path)?;
        self.check_reserved(leaf)?;
        let key = format_path(path);

        let mut steps = Vec::with_capacity(path.len());
        let parent = descend(&mut self.root, parents, &mut steps)?;
        let (container, kind, _) = container_of(parent, parents, leaf)?;
        let Some(removed) = parent.take(leaf) else {
            trace!(key = %key, "nothing to delete");
            return Ok(false);
        };

        steps.push(AncestorStep {
            container,
            kind,
            property: leaf.to_string(),
            previous: Some(removed.to_value()),
            value: None,
        });
        self.history.lock().add(NewEntry::new(EventKind::Delete, key));
        self.changed(ChangeStack::new(steps));
        Ok(true)
    }

    /// Register a callback for changes at `path` (`None`: anywhere).
    pub fn subscribe<F>(&self, path: Option<&str>, callback: F) -> Subscription
    where
        F: FnMut(&Value, &ChangeStack) + Send + 'static,
    {
        self.registry.subscribe(path, Box::new(callback))
    }

    /// Subscribe with the `$` shorthand: `"card.$user"` listens to
    /// `card.user`, `"$"` to the root. The callback runs once right away
    /// with the current value and an empty stack.
    pub fn listen<F>(&self, expr: &str, mut callback: F) -> Result<Subscription, EngineError>
    where
        F: FnMut(&Value, &ChangeStack) + Send + 'static,
    {
        let path = parse_listen_expr(expr)?;
        self.history.lock().add(NewEntry::new(
            EventKind::Listen,
            path.clone().unwrap_or_default(),
        ));
        let current = self
            .root
            .find_key(path.as_deref().unwrap_or_default())
            .map_or(Value::Null, Node::to_value);
        callback(&current, &ChangeStack::default());
        Ok(self.subscribe(path.as_deref(), callback))
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Run `mutator` with notifications held back. When the outermost freeze
    /// ends, every subscription touched by the batch fires exactly once.
    pub fn freeze<R>(&mut self, mutator: impl FnOnce(&mut Engine) -> R) -> R {
        self.batch.enter();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| mutator(self)));
        let pending = self.batch.exit();
        match outcome {
            Ok(result) => {
                if let Some(pending) = pending {
                    self.flush(pending);
                }
                result
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.batch.is_active()
    }

    /// Assign every top-level key of `added` as one batch.
    pub fn merge(&mut self, added: Map<String, Value>) -> Result<bool, EngineError> {
        self.freeze(|engine| {
            let mut changed = false;
            for (key, value) in added {
                changed |= engine.set_path(&[key], value)?;
            }
            Ok(changed)
        })
    }

    /// Snapshot of the history log.
    pub fn history(&self) -> History {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn check_reserved(&self, key: &str) -> Result<(), EngineError> {
        if self.options.is_reserved(key) {
            return Err(EngineError::ReservedKey(key.to_string()));
        }
        Ok(())
    }

    fn changed(&mut self, stack: ChangeStack) {
        self.save();
        if self.batch.is_active() {
            self.batch.defer(stack);
            return;
        }
        let notified = self.registry.dispatch(&self.root, &stack);
        if notified > 0 {
            debug!(key = %stack.key(), notified, "dispatched change");
        }
    }

    fn flush(&mut self, pending: Vec<ChangeStack>) {
        let notified = self.registry.flush(&self.root, &pending);
        debug!(changes = pending.len(), notified, "flushed batch");
    }

    fn save(&mut self) {
        let Some(store) = self.persistence.as_mut() else {
            return;
        };
        if let Err(err) = store.save(&self.root.to_value()) {
            error!(error = %err, "failed to persist state");
        }
    }
}

fn descend<'a, S: AsRef<str>>(
    mut node: &'a mut Node,
    path: &[S],
    steps: &mut Vec<AncestorStep>,
) -> Result<&'a mut Node, EngineError> {
    for (depth, step) in path.iter().enumerate() {
        let step = step.as_ref();
        let Some((container, kind)) = node.container() else {
            return Err(EngineError::NotContainer(format_path(&path[..depth])));
        };
        steps.push(AncestorStep::through(container, kind, step));
        node = match node.child_mut(step) {
            Some(child) => child,
            None => return Err(EngineError::PathNotFound(format_path(&path[..=depth]))),
        };
    }
    Ok(node)
}

/// Identify the container holding `leaf`. Sequence leaves resolve to their
/// index, which must fit in `usize`.
fn container_of<S: AsRef<str>>(
    parent: &Node,
    parents: &[S],
    leaf: &str,
) -> Result<(WrapperId, ContainerKind, Option<usize>), EngineError> {
    let (container, kind) = parent
        .container()
        .ok_or_else(|| EngineError::NotContainer(format_path(parents)))?;
    if kind == ContainerKind::Mapping {
        return Ok((container, kind, None));
    }
    match parse_index(leaf) {
        Some(index) => Ok((container, kind, Some(index))),
        None => Err(invalid_index(parents, leaf)),
    }
}

fn invalid_index<S: AsRef<str>>(parents: &[S], leaf: &str) -> EngineError {
    EngineError::InvalidIndex {
        key: format_path(parents),
        index: leaf.to_string(),
    }
}

fn parse_listen_expr(expr: &str) -> Result<Option<String>, EngineError> {
    let invalid = || EngineError::InvalidListenExpr(expr.to_string());
    let (prefix, last) = match expr.rsplit_once('.') {
        Some((prefix, last)) => (Some(prefix), last),
        None => (None, expr),
    };
    let name = last.strip_prefix('$').ok_or_else(invalid)?;
    let path = match (prefix, name.is_empty()) {
        (None, true) => return Ok(None),
        (None, false) => name.to_string(),
        (Some(prefix), true) => prefix.to_string(),
        (Some(prefix), false) => format!("{prefix}.{name}"),
    };
    atama_path::validate_key(&path).map_err(|_| invalid())?;
    Ok(Some(path))
}
