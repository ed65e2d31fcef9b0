//! Instrumented state tree.
//!
//! Every value stored in an engine lives in a [`Node`]: primitives pass
//! through untouched, while sequences and mappings are wrapped and receive a
//! [`WrapperId`]. The id identifies one live wrapper; replacing a property
//! drops the old nodes and allocates fresh ids for the new sub-structure.

use std::fmt;
use std::ops::Index;

use atama_path::{is_valid_index, SEPARATOR};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// Identity of one live container wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WrapperIds {
    next: u64,
}

impl WrapperIds {
    pub(crate) fn next(&mut self) -> WrapperId {
        self.next += 1;
        WrapperId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Sequence,
    Mapping,
}

/// Whether a value needs no instrumentation.
///
/// Booleans, numbers, strings and null are primitives. Absence (the
/// "undefined" of dynamic hosts) is modelled with `Option` at the call site.
pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[derive(Debug)]
pub enum Node {
    Primitive(Value),
    Sequence {
        id: WrapperId,
        items: Vec<Node>,
    },
    Mapping {
        id: WrapperId,
        entries: IndexMap<String, Node>,
    },
}

/// Most null slots a single write past the end of a sequence may add.
pub const MAX_SEQUENCE_PADDING: usize = 4096;

static NULL: Node = Node::Primitive(Value::Null);

impl Node {
    pub(crate) fn empty_mapping(ids: &mut WrapperIds) -> Self {
        Node::Mapping {
            id: ids.next(),
            entries: IndexMap::new(),
        }
    }

    /// Recursively instrument a plain value.
    pub(crate) fn wrap(value: Value, ids: &mut WrapperIds) -> Self {
        match value {
            Value::Array(items) => {
                let items = items.into_iter().map(|v| Node::wrap(v, ids)).collect();
                Node::Sequence {
                    id: ids.next(),
                    items,
                }
            }
            Value::Object(map) => {
                let entries = map
                    .into_iter()
                    .map(|(k, v)| (k, Node::wrap(v, ids)))
                    .collect();
                Node::Mapping {
                    id: ids.next(),
                    entries,
                }
            }
            primitive => Node::Primitive(primitive),
        }
    }

    /// Materialize the subtree as a plain JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Primitive(v) => v.clone(),
            Node::Sequence { items, .. } => Value::Array(items.iter().map(Node::to_value).collect()),
            Node::Mapping { entries, .. } => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_value());
                }
                Value::Object(map)
            }
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Node::Primitive(_))
    }

    pub fn wrapper_id(&self) -> Option<WrapperId> {
        self.container().map(|(id, _)| id)
    }

    pub fn container(&self) -> Option<(WrapperId, ContainerKind)> {
        match self {
            Node::Primitive(_) => None,
            Node::Sequence { id, .. } => Some((*id, ContainerKind::Sequence)),
            Node::Mapping { id, .. } => Some((*id, ContainerKind::Mapping)),
        }
    }

    /// Number of direct children; zero for primitives.
    pub fn len(&self) -> usize {
        match self {
            Node::Primitive(_) => 0,
            Node::Sequence { items, .. } => items.len(),
            Node::Mapping { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            Node::Primitive(_) => Vec::new(),
            Node::Sequence { items, .. } => (0..items.len()).map(|i| i.to_string()).collect(),
            Node::Mapping { entries, .. } => entries.keys().cloned().collect(),
        }
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Primitive(_) => None,
            Node::Sequence { items, .. } => items.get(parse_index(key)?),
            Node::Mapping { entries, .. } => entries.get(key),
        }
    }

    pub(crate) fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        match self {
            Node::Primitive(_) => None,
            Node::Sequence { items, .. } => items.get_mut(parse_index(key)?),
            Node::Mapping { entries, .. } => entries.get_mut(key),
        }
    }

    /// Resolve a dotted key; the empty key is this node.
    pub fn find_key(&self, key: &str) -> Option<&Node> {
        if key.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for step in key.split(SEPARATOR) {
            node = node.child(step)?;
        }
        Some(node)
    }

    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node> {
        let mut node = self;
        for step in path {
            node = node.child(step.as_ref())?;
        }
        Some(node)
    }

    /// Put `node` under `key`. Sequence writes past the end pad with null,
    /// at most [`MAX_SEQUENCE_PADDING`] slots. Returns `false` and leaves the
    /// tree untouched when `key` cannot be written.
    pub(crate) fn assign(&mut self, key: &str, node: Node) -> bool {
        match self {
            Node::Primitive(_) => false,
            Node::Sequence { items, .. } => {
                let Some(index) = parse_index(key) else {
                    return false;
                };
                if index < items.len() {
                    items[index] = node;
                    return true;
                }
                if index - items.len() > MAX_SEQUENCE_PADDING {
                    return false;
                }
                items.resize_with(index, || Node::Primitive(Value::Null));
                items.push(node);
                true
            }
            Node::Mapping { entries, .. } => {
                entries.insert(key.to_string(), node);
                true
            }
        }
    }

    /// Remove the child under `key`. Sequences close the gap.
    pub(crate) fn take(&mut self, key: &str) -> Option<Node> {
        match self {
            Node::Primitive(_) => None,
            Node::Sequence { items, .. } => {
                let index = parse_index(key)?;
                (index < items.len()).then(|| items.remove(index))
            }
            Node::Mapping { entries, .. } => entries.shift_remove(key),
        }
    }

    /// Structural equality against a plain value, exiting on the first
    /// difference. Numbers compare by value (`1` equals `1.0`) and mapping key
    /// order is ignored.
    pub fn equals_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Node::Primitive(Value::Number(a)), Value::Number(b)) => number_eq(a, b),
            (Node::Primitive(a), b) => a == b,
            (Node::Sequence { items, .. }, Value::Array(arr)) => {
                items.len() == arr.len() && items.iter().zip(arr).all(|(n, v)| n.equals_value(v))
            }
            (Node::Mapping { entries, .. }, Value::Object(map)) => {
                entries.len() == map.len()
                    && entries
                        .iter()
                        .all(|(k, n)| map.get(k).is_some_and(|v| n.equals_value(v)))
            }
            _ => false,
        }
    }
}

impl Index<&str> for Node {
    type Output = Node;

    fn index(&self, key: &str) -> &Node {
        self.child(key).unwrap_or(&NULL)
    }
}

impl Index<usize> for Node {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        match self {
            Node::Sequence { items, .. } => items.get(index).unwrap_or(&NULL),
            _ => &NULL,
        }
    }
}

impl PartialEq<Value> for Node {
    fn eq(&self, other: &Value) -> bool {
        self.equals_value(other)
    }
}

/// Sequence index of a step: canonical decimal that fits in `usize`.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if !is_valid_index(key) {
        return None;
    }
    key.parse().ok()
}

fn number_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
