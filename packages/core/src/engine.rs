//! The engine context: transaction batching and the engine-wide buses.
//!
//! Every store created from an [`Engine`] shares its batching counter, its
//! access bus and its "transaction finished" bus. Separate engines are fully
//! isolated from each other.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use cursorstore_tree::Value;

use crate::access::CursorAccess;
use crate::event::{Disposer, EventHandler};
use crate::store::Store;
use crate::EngineConfig;

/// Identifies one outermost batch of notifications.
pub type TransactionId = u64;

/// Broadcast once every time the outermost batch closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionFinished {
    pub transaction_id: TransactionId,
}

type Job = Box<dyn FnOnce(Option<TransactionId>)>;

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    next_store_id: Cell<u64>,
    lock: Cell<usize>,
    current_transaction: Cell<Option<TransactionId>>,
    next_transaction: Cell<TransactionId>,
    queue: RefCell<Vec<Job>>,
    pub(crate) access: EventHandler<CursorAccess>,
    pub(crate) transaction_finished: EventHandler<TransactionFinished>,
}

impl EngineInner {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            next_store_id: Cell::new(0),
            lock: Cell::new(0),
            current_transaction: Cell::new(None),
            next_transaction: Cell::new(1),
            queue: RefCell::new(Vec::new()),
            access: EventHandler::new(),
            transaction_finished: EventHandler::new(),
        }
    }

    pub(crate) fn allocate_store_id(&self) -> u64 {
        let id = self.next_store_id.get();
        self.next_store_id.set(id + 1);
        id
    }

    /// Open a batch scope. Notifications queued while any scope is open are
    /// delivered when the outermost one closes.
    pub(crate) fn begin_batch(&self) -> BatchGuard<'_> {
        if self.lock.get() == 0 {
            let id = self.next_transaction.get();
            self.next_transaction.set(id + 1);
            self.current_transaction.set(Some(id));
        }
        self.lock.set(self.lock.get() + 1);
        BatchGuard { engine: self }
    }

    fn end_batch(&self) {
        let depth = self.lock.get();
        if depth == 0 {
            if self.config.dev_mode {
                tracing::warn!("batch closed more often than it was opened");
            }
            return;
        }
        self.lock.set(depth - 1);
        if depth > 1 {
            return;
        }

        let Some(transaction_id) = self.current_transaction.take() else {
            return;
        };

        let mut delivered = 0;
        loop {
            let jobs = std::mem::take(&mut *self.queue.borrow_mut());
            if jobs.is_empty() {
                break;
            }
            delivered += jobs.len();
            for job in jobs {
                job(Some(transaction_id));
            }
        }
        tracing::debug!(transaction_id, notifications = delivered, "transaction finished");

        self.transaction_finished
            .emit(&TransactionFinished { transaction_id });
    }

    /// Run `job` now if no batch is open, otherwise when the outermost batch
    /// closes.
    pub(crate) fn run_when_outside_transaction(
        &self,
        job: impl FnOnce(Option<TransactionId>) + 'static,
    ) {
        if self.lock.get() > 0 {
            self.queue.borrow_mut().push(Box::new(job));
        } else {
            job(None);
        }
    }
}

/// Closes its batch scope when dropped.
pub(crate) struct BatchGuard<'a> {
    engine: &'a EngineInner,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.engine.end_batch();
    }
}

/// Shared context for a family of stores.
///
/// # Example
///
/// ```rust
/// use cursorstore_core::{Engine, Value};
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(serde_json::json!({"count": 1})));
/// let count = store.cursor().prop("count");
///
/// engine.transaction(|| {
///     count.set(2).unwrap();
///     count.set(3).unwrap();
/// });
/// assert_eq!(count.get().unwrap(), Value::from(3));
/// ```
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Rc<EngineInner>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(EngineInner::new(config)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Create a store holding `root` at version 0.
    pub fn create_store(&self, root: impl Into<Value>) -> Store {
        Store::new(self.inner.clone(), root.into())
    }

    /// Run `f` inside one batch: change and patch notifications raised by
    /// every update inside it are delivered once, after it returns.
    pub fn transaction<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.inner.begin_batch();
        f()
    }

    /// True while any batch scope is open.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock.get() > 0
    }

    /// Listen to every public read made through a cursor of this engine.
    pub fn on_access(&self, listener: impl Fn(&CursorAccess) + 'static) -> Disposer {
        self.inner.access.add(listener)
    }

    /// Listen for the end of every outermost batch.
    pub fn on_transaction_finished(
        &self,
        listener: impl Fn(&TransactionFinished) + 'static,
    ) -> Disposer {
        self.inner.transaction_finished.add(listener)
    }

    /// Drop every engine-wide listener and any notification still queued.
    ///
    /// Subscriptions made before teardown stop receiving batched
    /// notifications. Stores and cursors stay readable and writable.
    pub fn teardown(&self) {
        self.inner.access.clear();
        self.inner.transaction_finished.clear();
        self.inner.queue.borrow_mut().clear();
        tracing::debug!("engine torn down");
    }

    pub(crate) fn ptr_eq(&self, other: &Rc<EngineInner>) -> bool {
        Rc::ptr_eq(&self.inner, other)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("batch_depth", &self.inner.lock.get())
            .finish()
    }
}
