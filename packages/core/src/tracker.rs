//! Automatic re-subscription to whatever a computation read.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::event::{Disposer, EventHandler};
use crate::{subscribe_to_many, CursorAccess, CursorChange, Cursor, Engine, Error};

/// Tracks the cursors a function reads and reports when they change.
///
/// Each call to [`track`](Self::track) replaces the previous set of watched
/// cursors. Listeners receive one batch per transaction, holding only the
/// cursors whose value really changed.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use cursorstore_core::{CursorChangesTracker, Engine, Value};
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(serde_json::json!({"a": 1, "b": 1})));
/// let a = store.cursor().prop("a");
///
/// let tracker = CursorChangesTracker::new(&engine);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// let _listener = tracker.subscribe(move |changes| sink.borrow_mut().push(changes.len()));
///
/// tracker.track(|| { a.get().unwrap(); }).unwrap();
/// store.cursor().prop("b").set(2).unwrap();
/// a.set(2).unwrap();
/// assert_eq!(*seen.borrow(), vec![1]);
/// ```
#[derive(Clone)]
pub struct CursorChangesTracker {
    inner: Rc<TrackerInner>,
}

struct TrackerInner {
    engine: Engine,
    subscription: RefCell<Option<Disposer>>,
    listeners: EventHandler<Vec<CursorChange>>,
    disposed: Cell<bool>,
}

impl CursorChangesTracker {
    pub fn new(engine: &Engine) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                engine: engine.clone(),
                subscription: RefCell::new(None),
                listeners: EventHandler::new(),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Run `f`, then watch exactly the distinct cursors it read.
    ///
    /// Returns the reads in order.
    pub fn track(&self, f: impl FnOnce()) -> Result<Vec<CursorAccess>, Error> {
        if self.inner.disposed.get() {
            return Err(Error::misuse("the tracker has been disposed"));
        }

        let ((), accesses) = self.inner.engine.track_access(f);

        let mut cursors: Vec<Cursor> = Vec::new();
        for access in &accesses {
            if !cursors.contains(&access.cursor) {
                cursors.push(access.cursor.clone());
            }
        }

        let previous = self.inner.subscription.borrow_mut().take();
        if let Some(mut previous) = previous {
            previous.dispose();
        }

        if !cursors.is_empty() {
            let listeners = self.inner.listeners.clone();
            let subscription = subscribe_to_many(&cursors, move |changes| {
                let changed: Vec<CursorChange> =
                    changes.iter().filter(|c| c.changed).cloned().collect();
                if !changed.is_empty() {
                    listeners.emit(&changed);
                }
            })?;
            *self.inner.subscription.borrow_mut() = Some(subscription);
        }
        tracing::trace!(cursors = cursors.len(), "tracker subscribed");
        Ok(accesses)
    }

    /// Listen for batches of changes to the tracked cursors.
    pub fn subscribe(&self, listener: impl Fn(&[CursorChange]) + 'static) -> Disposer {
        self.inner
            .listeners
            .add(move |changes: &Vec<CursorChange>| listener(changes))
    }

    /// Drop every subscription and listener. The tracker cannot be used
    /// afterwards.
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
        let subscription = self.inner.subscription.borrow_mut().take();
        if let Some(mut subscription) = subscription {
            subscription.dispose();
        }
        self.inner.listeners.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl fmt::Debug for CursorChangesTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorChangesTracker")
            .field("tracking", &self.inner.subscription.borrow().is_some())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}
