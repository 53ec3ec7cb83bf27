//! CursorStore: versioned immutable trees read and written through cursors.
//!
//! The crates are layered:
//! - [`tree`]: the `Value` tree, paths, patches and structural sharing
//! - [`store`]: engines, stores, cursors, updates and subscriptions
//! - [`lenses`]: views and actions bound to cursors
//!
//! The most used items are re-exported at the top level.

pub use cursorstore_core as store;
pub use cursorstore_lens as lenses;
pub use cursorstore_tree as tree;

pub use cursorstore_core::{
    rollback, subscribe_to, subscribe_to_many, subscribe_to_patches, Cursor, CursorChange,
    CursorChangesTracker, Disposer, Draft, Engine, EngineConfig, Error, Outcome, SafeRead, Store,
};
pub use cursorstore_lens::{lens, subscribe_to_lens, Lens, LensDef, LensInstance};
pub use cursorstore_tree::{path, Key, Patch, Path, Value};
