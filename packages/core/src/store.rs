//! Versioned stores.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use cursorstore_tree::{Patch, Value};

use crate::arena::{Arena, CursorId};
use crate::engine::{EngineInner, TransactionId};
use crate::event::{Disposer, EventHandler};
use crate::{Cursor, Engine, Error};

/// Raised after an update replaced a store's root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreChanged {
    pub version: u64,
    pub transaction_id: Option<TransactionId>,
}

/// Forward and inverse patches of one committed update.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchEvent {
    pub patches: Vec<Patch>,
    pub inverse_patches: Vec<Patch>,
    pub transaction_id: Option<TransactionId>,
}

pub(crate) struct StoreInner {
    pub(crate) id: u64,
    pub(crate) engine: Rc<EngineInner>,
    pub(crate) root: RefCell<Value>,
    pub(crate) version: Cell<u64>,
    /// Set only while a top-level update runs.
    pub(crate) draft: RefCell<Option<Value>>,
    pub(crate) update_cancelled: Cell<bool>,
    pub(crate) arena: RefCell<Arena>,
    /// Descriptors whose last cursor went away while the arena was
    /// borrowed. Freed on the next derivation.
    pub(crate) released: RefCell<Vec<CursorId>>,
    pub(crate) changes: EventHandler<StoreChanged>,
    pub(crate) patches: EventHandler<PatchEvent>,
}

impl StoreInner {
    pub(crate) fn is_updating(&self) -> bool {
        match self.draft.try_borrow() {
            Ok(draft) => draft.is_some(),
            // only a draft mutation in progress holds this borrow
            Err(_) => true,
        }
    }

    pub(crate) fn draft(&self) -> Result<Ref<'_, Option<Value>>, Error> {
        self.draft
            .try_borrow()
            .map_err(|_| Error::misuse("the draft is being modified"))
    }

    pub(crate) fn draft_mut(&self) -> Result<RefMut<'_, Option<Value>>, Error> {
        self.draft
            .try_borrow_mut()
            .map_err(|_| Error::misuse("the draft is already borrowed"))
    }
}

/// A handle to one immutable tree and its version history.
///
/// Clones refer to the same store.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Rc<StoreInner>,
}

impl Store {
    pub(crate) fn new(engine: Rc<EngineInner>, root: Value) -> Self {
        let id = engine.allocate_store_id();
        tracing::trace!(store = id, "created store");
        Self {
            inner: Rc::new(StoreInner {
                id,
                engine,
                root: RefCell::new(root),
                version: Cell::new(0),
                draft: RefCell::new(None),
                update_cancelled: Cell::new(false),
                arena: RefCell::new(Arena::new()),
                released: RefCell::new(Vec::new()),
                changes: EventHandler::new(),
                patches: EventHandler::new(),
            }),
        }
    }

    /// The root cursor.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            store: self.inner.clone(),
            id: CursorId::ROOT,
            lease: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Incremented once per committed update that replaced the root.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The committed root. Never the in-flight draft.
    pub fn snapshot(&self) -> Value {
        self.inner.root.borrow().clone()
    }

    /// True while an update on this store is running.
    pub fn is_updating(&self) -> bool {
        self.inner.is_updating()
    }

    pub fn engine(&self) -> Engine {
        Engine {
            inner: self.inner.engine.clone(),
        }
    }

    /// Listen for committed root replacements. Delivered once the enclosing
    /// batch closes, one event per committed update.
    pub fn on_change(&self, listener: impl Fn(&StoreChanged) + 'static) -> Disposer {
        self.inner.changes.add(listener)
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Store {}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("version", &self.inner.version.get())
            .field("updating", &self.inner.is_updating())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Value};
    use serde_json::json;

    #[test]
    fn new_store_starts_at_version_zero() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        assert_eq!(store.version(), 0);
        assert!(!store.is_updating());
        assert_eq!(store.snapshot(), Value::from(json!({"a": 1})));
        assert!(store.cursor().is_root());
    }

    #[test]
    fn stores_get_distinct_ids() {
        let engine = Engine::default();
        let a = engine.create_store(Value::Null);
        let b = engine.create_store(Value::Null);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn snapshot_is_shared_not_copied() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": [1, 2]})));
        assert!(store.snapshot().same(&store.snapshot()));
    }

    #[test]
    fn version_moves_only_on_real_changes() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let a = store.cursor().prop("a");

        a.set(1).unwrap();
        assert_eq!(store.version(), 0);
        a.set(2).unwrap();
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn is_updating_inside_a_recipe() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let inner = store.clone();
        store
            .cursor()
            .update(move |_| {
                assert!(inner.is_updating());
                Ok(crate::Outcome::Mutated)
            })
            .unwrap();
        assert!(!store.is_updating());
    }
}
