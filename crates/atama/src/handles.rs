//! Path-bound views into an [`Engine`] tree.

use serde_json::Value;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::listeners::Subscription;
use crate::node::{ContainerKind, Node, WrapperId};
use crate::stack::ChangeStack;

/// A location in the tree. Navigation never fails; reads on a missing
/// location return `None` and writes report the error.
pub struct NodeHandle<'a> {
    engine: &'a mut Engine,
    path: Vec<String>,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(engine: &'a mut Engine, path: Vec<String>) -> Self {
        Self { engine, path }
    }

    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.push(key.into());
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.path.push(index.to_string());
        self
    }

    /// Descend along a dotted key.
    pub fn at(mut self, key: &str) -> Self {
        self.path.extend(atama_path::parse_path(key));
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Dotted key of this location; empty for the root.
    pub fn key(&self) -> String {
        atama_path::format_path(&self.path)
    }

    pub fn node(&self) -> Option<&Node> {
        self.engine.root().find(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.node().is_some()
    }

    pub fn wrapper_id(&self) -> Option<WrapperId> {
        self.node().and_then(Node::wrapper_id)
    }

    pub fn len(&self) -> usize {
        self.node().map_or(0, Node::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self) -> Option<Value> {
        self.engine.get_path(&self.path)
    }

    pub fn set(&mut self, value: impl Into<Value>) -> Result<bool, EngineError> {
        self.engine.set_path(&self.path, value.into())
    }

    pub fn remove(&mut self) -> Result<bool, EngineError> {
        self.engine.remove_path(&self.path)
    }

    pub fn set_key(&mut self, key: &str, value: impl Into<Value>) -> Result<bool, EngineError> {
        let path = self.child_path(key);
        self.engine.set_path(&path, value.into())
    }

    pub fn remove_key(&mut self, key: &str) -> Result<bool, EngineError> {
        let path = self.child_path(key);
        self.engine.remove_path(&path)
    }

    /// Append to the sequence at this location.
    pub fn push(&mut self, value: impl Into<Value>) -> Result<bool, EngineError> {
        let len = match self.node().map(|node| (node.container(), node.len())) {
            Some((Some((_, ContainerKind::Sequence)), len)) => len,
            Some(_) => return Err(EngineError::NotContainer(self.key())),
            None => return Err(EngineError::PathNotFound(self.key())),
        };
        let path = self.child_path(&len.to_string());
        self.engine.set_path(&path, value.into())
    }

    /// Subscribe to changes at or around this location.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Value, &ChangeStack) + Send + 'static,
    {
        let key = self.key();
        let path = (!key.is_empty()).then_some(key.as_str());
        self.engine.subscribe(path, callback)
    }

    fn child_path(&self, key: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(key.to_string());
        path
    }
}
