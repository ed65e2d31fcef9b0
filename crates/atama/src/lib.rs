//! Deep reactivity over JSON-shaped state.
//!
//! An [`Engine`] owns a tree of primitives, sequences and mappings. Every
//! mutation is compared against the stored value, recorded in a bounded
//! [`History`], and dispatched to the subscriptions whose path overlaps the
//! changed key. [`Engine::freeze`] batches mutations so each affected
//! subscription fires once.
//!
//! ```
//! use atama::{ChangeStack, Engine};
//! use serde_json::{json, Value};
//! use std::sync::{Arc, Mutex};
//!
//! let mut engine = Engine::new();
//! engine.set("user", json!({"name": "Ann"})).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! engine.subscribe(Some("user"), move |value: &Value, stack: &ChangeStack| {
//!     sink.lock().unwrap().push((value.clone(), stack.key()));
//! });
//!
//! engine.set("user.name", "Bob").unwrap();
//! assert_eq!(
//!     seen.lock().unwrap().as_slice(),
//!     &[(json!({"name": "Bob"}), "user.name".to_string())]
//! );
//! ```

mod batch;
pub mod engine;
pub mod error;
pub mod handles;
pub mod history;
pub mod listeners;
pub mod node;
pub mod options;
pub mod persist;
pub mod stack;

pub use engine::Engine;
pub use error::{EngineError, OptionsError, PersistError};
pub use handles::NodeHandle;
pub use history::{EventKind, History, HistoryEntry, NewEntry, TraceMode};
pub use listeners::{path_matches, Callback, Subscription};
pub use node::{ContainerKind, Node, WrapperId};
pub use options::EngineOptions;
pub use persist::{FileStore, MemoryStore, Persistence, Snapshot};
pub use stack::{AncestorStep, ChangeStack};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
