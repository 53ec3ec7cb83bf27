//! Cursor engine: versioned stores, lazy cursors and update transactions.
//!
//! This layer addresses an immutable [`Value`] tree through cursors:
//! - `Engine`: the shared context (batching counter, access bus)
//! - `Store`: one tree, its version counter and its in-flight draft
//! - `Cursor`: an identity-stable path into a store, read with memoization
//!   and written through all-or-nothing, nestable updates
//! - `subscribe_to` / `subscribe_to_many` / `subscribe_to_patches`: change
//!   notifications, coalesced per transaction
//! - `CursorChangesTracker`: re-subscribes to whatever a function read
//!
//! Everything is single-threaded: handles are `Rc`-based and not `Send`.
//!
//! # Example
//!
//! ```rust
//! use cursorstore_core::{subscribe_to, Engine, Outcome, Value};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let engine = Engine::default();
//! let store = engine.create_store(Value::from(serde_json::json!({
//!     "users": [{"name": "first"}, {"name": "second"}]
//! })));
//! let users = store.cursor().prop("users");
//!
//! let names = Rc::new(RefCell::new(Vec::new()));
//! let sink = names.clone();
//! let mut subscription = subscribe_to(&users.index(0).prop("name"), move |change| {
//!     sink.borrow_mut().push(change.new_value.clone());
//! });
//!
//! users
//!     .update(|draft| {
//!         draft.modify(|users| {
//!             if let Some(list) = users.as_array_mut() {
//!                 list.swap(0, 1);
//!             }
//!         })?;
//!         Ok(Outcome::Mutated)
//!     })
//!     .unwrap();
//!
//! assert_eq!(names.borrow().len(), 1);
//! subscription.dispose();
//! ```

mod access;
mod arena;
mod config;
mod cursor;
mod engine;
mod error;
mod eval;
mod event;
mod step;
mod store;
mod subscribe;
mod tracker;
mod update;

pub use access::CursorAccess;
pub use config::EngineConfig;
pub use cursor::Cursor;
pub use engine::{Engine, TransactionFinished, TransactionId};
pub use error::{rollback, Error};
pub use eval::SafeRead;
pub use event::{Disposer, EventHandler};
pub use step::{CallContext, CallFn, Step, TransformFn};
pub use store::{PatchEvent, Store, StoreChanged};
pub use subscribe::{subscribe_to, subscribe_to_many, subscribe_to_patches, CursorChange};
pub use tracker::CursorChangesTracker;
pub use update::{Draft, Outcome};

// Re-export the tree types for convenience
pub use cursorstore_tree::{path, Key, Patch, PatchOp, Path, Value};
