//! Subscriptions: detecting real value changes per cursor.
//!
//! A subscription keeps the last delivered value of each of its cursors.
//! After every committed update it re-reads them (safely, without reporting
//! on the access bus) and marks the ones whose value is no longer the same.
//! When the outermost batch closes, a subscription with at least one real
//! change calls its listener once with a record per cursor.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::TransactionId;
use crate::event::Disposer;
use crate::store::{PatchEvent, StoreChanged, StoreInner};
use crate::{Cursor, Error, SafeRead};

/// The state of one subscribed cursor at the end of a batch.
#[derive(Clone, Debug)]
pub struct CursorChange {
    pub cursor: Cursor,
    /// The value delivered last time (or read at subscription).
    pub old_value: SafeRead,
    pub new_value: SafeRead,
    pub changed: bool,
    /// The batch in which the change was observed.
    pub transaction_id: Option<TransactionId>,
}

struct Slot {
    cursor: Cursor,
    old_value: SafeRead,
    new_value: SafeRead,
    changed: bool,
    transaction_id: Option<TransactionId>,
}

impl Slot {
    fn new(cursor: &Cursor) -> Self {
        let value = cursor.peek();
        Self {
            cursor: cursor.clone(),
            old_value: value.clone(),
            new_value: value,
            changed: false,
            transaction_id: None,
        }
    }

    fn really_changed(&self) -> bool {
        self.changed && !self.old_value.same(&self.new_value)
    }
}

/// Subscribe to several cursors at once.
///
/// The listener receives one [`CursorChange`] per cursor, in the order
/// given, whenever a batch changed at least one of them.
///
/// # Errors
///
/// In dev mode, [`Error::InvalidCursor`] when the cursors do not all belong
/// to the same engine.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use cursorstore_core::{subscribe_to_many, Engine, Value};
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(serde_json::json!({"a": 1, "b": 1})));
/// let a = store.cursor().prop("a");
/// let b = store.cursor().prop("b");
///
/// let calls = Rc::new(Cell::new(0));
/// let seen = calls.clone();
/// let mut subscription = subscribe_to_many(&[a.clone(), b.clone()], move |changes| {
///     assert_eq!(changes.len(), 2);
///     seen.set(seen.get() + 1);
/// })
/// .unwrap();
///
/// engine.transaction(|| {
///     a.set(2).unwrap();
///     b.set(2).unwrap();
/// });
/// assert_eq!(calls.get(), 1);
/// subscription.dispose();
/// ```
pub fn subscribe_to_many<F>(cursors: &[Cursor], listener: F) -> Result<Disposer, Error>
where
    F: Fn(&[CursorChange]) + 'static,
{
    let Some(first) = cursors.first() else {
        return Ok(Disposer::noop());
    };

    let engine = first.engine();
    if engine.config().dev_mode {
        if let Some(foreign) = cursors
            .iter()
            .find(|cursor| !engine.ptr_eq(&cursor.store.engine))
        {
            tracing::warn!(cursor = %foreign, "subscription mixes engines");
            return Err(Error::InvalidCursor {
                message: format!("{:?} belongs to a different engine", foreign),
            });
        }
    }

    let slots = Rc::new(RefCell::new(
        cursors.iter().map(Slot::new).collect::<Vec<_>>(),
    ));

    let mut stores: Vec<Rc<StoreInner>> = Vec::new();
    for cursor in cursors {
        if !stores.iter().any(|store| Rc::ptr_eq(store, &cursor.store)) {
            stores.push(cursor.store.clone());
        }
    }

    let mut disposers = Vec::with_capacity(stores.len() + 1);
    for store in stores {
        let slots = slots.clone();
        let store_ptr = Rc::as_ptr(&store);
        disposers.push(store.changes.add(move |event: &StoreChanged| {
            let mut slots = slots.borrow_mut();
            for slot in slots
                .iter_mut()
                .filter(|slot| Rc::as_ptr(&slot.cursor.store) == store_ptr)
            {
                let value = slot.cursor.peek();
                if !value.same(&slot.new_value) {
                    slot.new_value = value;
                    slot.changed = true;
                    slot.transaction_id = event.transaction_id;
                }
            }
        }));
    }

    disposers.push(engine.on_transaction_finished(move |_| {
        let changes = {
            let mut slots = slots.borrow_mut();
            let deliver = slots.iter().any(Slot::really_changed);
            let changes: Vec<CursorChange> = if deliver {
                slots
                    .iter()
                    .map(|slot| CursorChange {
                        cursor: slot.cursor.clone(),
                        old_value: slot.old_value.clone(),
                        new_value: slot.new_value.clone(),
                        changed: slot.really_changed(),
                        transaction_id: slot.transaction_id,
                    })
                    .collect()
            } else {
                Vec::new()
            };
            for slot in slots.iter_mut() {
                slot.old_value = slot.new_value.clone();
                slot.changed = false;
                slot.transaction_id = None;
            }
            changes
        };
        if !changes.is_empty() {
            listener(&changes);
        }
    }));

    Ok(Disposer::from_many(disposers))
}

/// Subscribe to a single cursor.
pub fn subscribe_to<F>(cursor: &Cursor, listener: F) -> Disposer
where
    F: Fn(&CursorChange) + 'static,
{
    match subscribe_to_many(std::slice::from_ref(cursor), move |changes| {
        if let Some(change) = changes.first() {
            listener(change);
        }
    }) {
        Ok(disposer) => disposer,
        // a single cursor always agrees with its own engine
        Err(_) => Disposer::noop(),
    }
}

/// Receive the forward and inverse patches of every committed update.
///
/// # Errors
///
/// [`Error::PatchSubscriptionScope`] unless `cursor` is a root cursor.
pub fn subscribe_to_patches<F>(cursor: &Cursor, listener: F) -> Result<Disposer, Error>
where
    F: Fn(&PatchEvent) + 'static,
{
    if !cursor.is_root() {
        return Err(Error::PatchSubscriptionScope {
            cursor: cursor.to_string(),
        });
    }
    Ok(cursor.store.patches.add(listener))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, EngineConfig, Value};
    use serde_json::json;
    use std::cell::RefCell;

    fn collect(cursor: &Cursor) -> (Rc<RefCell<Vec<CursorChange>>>, Disposer) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let disposer = subscribe_to(cursor, move |change| sink.borrow_mut().push(change.clone()));
        (log, disposer)
    }

    #[test]
    fn unrelated_updates_are_not_delivered() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": {"x": 1}, "b": 1})));
        let (log, _d) = collect(&store.cursor().prop("a"));

        store.cursor().prop("b").set(2).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn change_carries_old_and_new() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let a = store.cursor().prop("a");
        let (log, _d) = collect(&a);

        a.set(2).unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].old_value, SafeRead::Value(Value::from(1)));
        assert_eq!(log[0].new_value, SafeRead::Value(Value::from(2)));
        assert!(log[0].changed);
        assert!(log[0].transaction_id.is_some());
    }

    #[test]
    fn change_and_revert_inside_a_transaction_is_silent() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let a = store.cursor().prop("a");
        let (log, _d) = collect(&a);

        engine.transaction(|| {
            a.set(2).unwrap();
            a.set(1).unwrap();
        });
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn broken_to_value_is_a_change() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({})));
        let deep = store.cursor().prop("a").prop("b");
        let (log, _d) = collect(&deep);

        store.cursor().prop("a").set(Value::from(json!({"b": 5}))).unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert!(log[0].old_value.is_broken());
        assert_eq!(log[0].new_value, SafeRead::Value(Value::from(5)));
    }

    #[test]
    fn disposed_subscriptions_stay_quiet() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let a = store.cursor().prop("a");
        let (log, mut disposer) = collect(&a);
        disposer.dispose();

        a.set(2).unwrap();
        assert!(log.borrow().is_empty());
        assert!(store.inner.changes.is_empty());
    }

    #[test]
    fn subscriptions_span_stores() {
        let engine = Engine::default();
        let left = engine.create_store(Value::from(1));
        let right = engine.create_store(Value::from(1));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _d = subscribe_to_many(&[left.cursor(), right.cursor()], move |changes| {
            sink.borrow_mut()
                .push(changes.iter().map(|c| c.changed).collect::<Vec<_>>())
        })
        .unwrap();

        right.cursor().set(2).unwrap();
        assert_eq!(*log.borrow(), vec![vec![false, true]]);
    }

    #[test]
    fn mixing_engines_fails_in_dev_mode() {
        let dev = Engine::new(EngineConfig::development());
        let other = Engine::new(EngineConfig::development());
        let a = dev.create_store(Value::Null).cursor();
        let b = other.create_store(Value::Null).cursor();
        let err = subscribe_to_many(&[a, b], |_| {}).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { .. }));
    }

    #[test]
    fn patches_only_at_root() {
        let engine = Engine::default();
        let store = engine.create_store(Value::from(json!({"a": 1})));
        let err = subscribe_to_patches(&store.cursor().prop("a"), |_| {}).unwrap_err();
        assert!(matches!(err, Error::PatchSubscriptionScope { .. }));

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _d = subscribe_to_patches(&store.cursor(), move |event| {
            sink.borrow_mut().push(event.clone())
        })
        .unwrap();
        store.cursor().prop("a").set(2).unwrap();

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].patches.len(), 1);
        assert_eq!(events[0].inverse_patches[0].value, Some(Value::from(1)));
    }
}
