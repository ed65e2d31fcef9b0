use std::ops::Deref;

use serde_json::Value;

use crate::node::{ContainerKind, WrapperId};

/// One level of the traversal that led to a change.
///
/// `previous` and `value` are only filled on the final step: they hold the
/// old and new value of the changed property (`None` when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct AncestorStep {
    pub container: WrapperId,
    pub kind: ContainerKind,
    pub property: String,
    pub previous: Option<Value>,
    pub value: Option<Value>,
}

impl AncestorStep {
    pub(crate) fn through(container: WrapperId, kind: ContainerKind, property: &str) -> Self {
        Self {
            container,
            kind,
            property: property.to_string(),
            previous: None,
            value: None,
        }
    }
}

/// Root-first ancestor steps describing where a change happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeStack {
    steps: Vec<AncestorStep>,
}

impl ChangeStack {
    pub fn new(steps: Vec<AncestorStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[AncestorStep] {
        &self.steps
    }

    /// Dotted key of the deepest change.
    pub fn key(&self) -> String {
        atama_path::format_path(&self.path())
    }

    /// Dotted key of every level, root-first: `a`, `a.b`, `a.b.c`.
    pub fn keys(&self) -> Vec<String> {
        let path = self.path();
        (1..=path.len())
            .map(|i| atama_path::format_path(&path[..i]))
            .collect()
    }

    pub fn path(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.property.as_str()).collect()
    }
}

impl Deref for ChangeStack {
    type Target = [AncestorStep];

    fn deref(&self) -> &[AncestorStep] {
        &self.steps
    }
}
