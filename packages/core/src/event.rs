//! Listener lists and their disposers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Listener<E> = Rc<dyn Fn(&E)>;

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Listener<E>)>,
}

/// An ordered list of listeners for one kind of event.
///
/// Clones share the same list. Listeners run in registration order; a
/// listener added or removed while an event is being delivered takes effect
/// from the next event on.
pub struct EventHandler<E> {
    inner: Rc<RefCell<Listeners<E>>>,
}

impl<E: 'static> EventHandler<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Disposer`] is disposed.
    pub fn add(&self, listener: impl Fn(&E) + 'static) -> Disposer {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, Rc::new(listener)));
            id
        };

        let list = Rc::downgrade(&self.inner);
        Disposer::new(move || {
            if let Some(list) = list.upgrade() {
                list.borrow_mut().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.inner.borrow_mut().entries.clear();
    }
}

impl<E: 'static> Default for EventHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventHandler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for EventHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("listeners", &self.inner.borrow().entries.len())
            .finish()
    }
}

/// Removes a subscription when disposed.
///
/// Dropping a `Disposer` without calling [`Disposer::dispose`] leaves the
/// subscription in place.
#[must_use = "a subscription can only be removed through its Disposer"]
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A disposer with nothing to remove.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    /// One disposer for several subscriptions, disposed in order.
    pub fn from_many(disposers: Vec<Disposer>) -> Self {
        Disposer::new(move || {
            for mut disposer in disposers {
                disposer.dispose();
            }
        })
    }

    /// Remove the subscription. Calling this again does nothing.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.dispose.is_none()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn listeners_run_in_registration_order() {
        let handler = EventHandler::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = log.clone();
        let _a = handler.add(move |n| first.borrow_mut().push(("a", *n)));
        let second = log.clone();
        let _b = handler.add(move |n| second.borrow_mut().push(("b", *n)));

        handler.emit(&7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dispose_removes_only_its_listener() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let mut a = handler.add(move |_| c.set(c.get() + 1));
        let c = count.clone();
        let _b = handler.add(move |_| c.set(c.get() + 10));

        a.dispose();
        a.dispose();
        assert!(a.is_disposed());
        handler.emit(&());
        assert_eq!(count.get(), 10);
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn dropping_a_disposer_keeps_the_listener() {
        let handler = EventHandler::<()>::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        drop(handler.add(move |_| c.set(c.get() + 1)));
        handler.emit(&());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_while_emitting() {
        let handler = EventHandler::<()>::new();
        let slot: Rc<RefCell<Option<Disposer>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(Cell::new(0));

        let inner_slot = slot.clone();
        let c = count.clone();
        let disposer = handler.add(move |_| {
            c.set(c.get() + 1);
            if let Some(mut d) = inner_slot.borrow_mut().take() {
                d.dispose();
            }
        });
        *slot.borrow_mut() = Some(disposer);

        handler.emit(&());
        handler.emit(&());
        assert_eq!(count.get(), 1);
        assert!(handler.is_empty());
    }

    #[test]
    fn from_many_disposes_all() {
        let handler = EventHandler::<()>::new();
        let a = handler.add(|_| {});
        let b = handler.add(|_| {});
        let mut both = Disposer::from_many(vec![a, b]);
        both.dispose();
        assert!(handler.is_empty());
    }
}
