//! The access bus: who read what.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{Cursor, Engine, SafeRead};

/// One public read made through a cursor.
#[derive(Clone, Debug)]
pub struct CursorAccess {
    pub cursor: Cursor,
    pub value: SafeRead,
}

impl Engine {
    /// Run `f` and collect every read it made, in order, duplicates included.
    ///
    /// ```rust
    /// use cursorstore_core::{Engine, Value};
    ///
    /// let engine = Engine::default();
    /// let store = engine.create_store(Value::from(serde_json::json!({"a": 1, "b": 2})));
    /// let root = store.cursor();
    ///
    /// let (sum, accesses) = engine.track_access(|| {
    ///     let a = root.prop("a").get().unwrap().as_i64().unwrap_or(0);
    ///     let b = root.prop("b").get().unwrap().as_i64().unwrap_or(0);
    ///     a + b
    /// });
    /// assert_eq!(sum, 3);
    /// assert_eq!(accesses.len(), 2);
    /// assert_eq!(accesses[0].cursor, root.prop("a"));
    /// ```
    pub fn track_access<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<CursorAccess>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let mut listener = self.on_access(move |access| sink.borrow_mut().push(access.clone()));
        let result = f();
        listener.dispose();
        let accesses = std::mem::take(&mut *log.borrow_mut());
        (result, accesses)
    }
}
