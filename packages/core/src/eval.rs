//! Evaluating a cursor's steps against a snapshot.

use cursorstore_tree::Value;

use crate::arena::Mode;
use crate::step::{CallContext, Step};
use crate::{Cursor, Error};

/// The result of a safe read.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum SafeRead {
    Value(Value),
    /// A step was reached with nothing to apply it to.
    #[default]
    Broken,
}

impl SafeRead {
    pub fn is_broken(&self) -> bool {
        matches!(self, SafeRead::Broken)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            SafeRead::Value(value) => Some(value),
            SafeRead::Broken => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            SafeRead::Value(value) => Some(value),
            SafeRead::Broken => None,
        }
    }

    /// Identity comparison, see [`Value::same`].
    pub fn same(&self, other: &SafeRead) -> bool {
        match (self, other) {
            (SafeRead::Value(a), SafeRead::Value(b)) => a.same(b),
            (SafeRead::Broken, SafeRead::Broken) => true,
            _ => false,
        }
    }
}

impl From<Value> for SafeRead {
    fn from(value: Value) -> Self {
        SafeRead::Value(value)
    }
}

/// Walk `cursor`'s steps.
///
/// `use_draft` reads the store's in-flight draft instead of its committed
/// root, and bypasses the memo slots. So do cursors whose calls read
/// another store, as this store's version says nothing about theirs. In [`Mode::Safe`] a null value before
/// any step yields [`SafeRead::Broken`]; in [`Mode::Strict`] a key or call
/// step on null fails with [`Error::NullDereference`]. A transform step is
/// always applied, null or not, unless the read is safe.
pub(crate) fn evaluate(cursor: &Cursor, mode: Mode, use_draft: bool) -> Result<SafeRead, Error> {
    let store = &cursor.store;
    let memoize = store.engine.config.memoize && !use_draft && !cursor.is_external();
    let version = store.version.get();

    if memoize {
        if let Some(hit) = store.arena.borrow().memo(cursor.id, mode, version) {
            tracing::trace!(store = store.id, cursor = %cursor, "memo hit");
            return Ok(hit);
        }
    }

    let steps = store.arena.borrow().node(cursor.id).steps.clone();
    let value = if use_draft {
        match &*store.draft()? {
            Some(draft) => draft.clone(),
            None => store.root.borrow().clone(),
        }
    } else {
        store.root.borrow().clone()
    };

    // No arena, root or draft borrow is held past this point: call and
    // transform steps run user code, which may read other cursors.
    let result = walk(cursor, &steps, value, mode, use_draft)?;

    if memoize && store.version.get() == version {
        store
            .arena
            .borrow_mut()
            .remember(cursor.id, mode, version, result.clone());
    }
    Ok(result)
}

fn walk(
    cursor: &Cursor,
    steps: &[Step],
    mut value: Value,
    mode: Mode,
    use_draft: bool,
) -> Result<SafeRead, Error> {
    for step in steps {
        if value.is_null() {
            match (mode, step) {
                (Mode::Safe, _) => return Ok(SafeRead::Broken),
                (Mode::Strict, Step::Transform(_)) => {}
                (Mode::Strict, _) => {
                    return Err(Error::NullDereference {
                        cursor: cursor.to_string(),
                        step: step.to_string(),
                    })
                }
            }
        }

        value = match step {
            Step::Key(key) => value.get(key).cloned().unwrap_or_default(),
            Step::Call {
                context,
                function,
                args,
                ..
            } => {
                let this = match context {
                    CallContext::Receiver => value,
                    CallContext::Value(fixed) => fixed.clone(),
                    CallContext::Cursor(other) => {
                        let other_draft = use_draft && other.store.is_updating();
                        match evaluate(other, mode, other_draft)? {
                            SafeRead::Value(v) => v,
                            SafeRead::Broken => return Ok(SafeRead::Broken),
                        }
                    }
                };
                function(&this, args)
            }
            Step::Transform(transform) => transform(&value),
        };
    }
    Ok(SafeRead::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, EngineConfig};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn store() -> crate::Store {
        Engine::default().create_store(Value::from(json!({
            "users": [{"name": "first"}, {"name": "second"}],
            "empty": null
        })))
    }

    #[test]
    fn key_steps() {
        let store = store();
        let name = store.cursor().prop("users").index(1).prop("name");
        assert_eq!(
            evaluate(&name, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::from("second"))
        );
    }

    #[test]
    fn missing_leaf_is_null_in_both_modes() {
        let store = store();
        let missing = store.cursor().prop("users").index(5);
        assert_eq!(
            evaluate(&missing, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::Null)
        );
        assert_eq!(
            evaluate(&missing, Mode::Safe, false).unwrap(),
            SafeRead::Value(Value::Null)
        );
    }

    #[test]
    fn stepping_through_null() {
        let store = store();
        let deep = store.cursor().prop("empty").prop("x");
        assert!(evaluate(&deep, Mode::Safe, false).unwrap().is_broken());
        let err = evaluate(&deep, Mode::Strict, false).unwrap_err();
        assert!(matches!(err, Error::NullDereference { ref step, .. } if step == "x"));
    }

    #[test]
    fn transform_applies_to_null_in_strict_mode() {
        let store = store();
        let defaulted = store
            .cursor()
            .prop("empty")
            .transform(|v| if v.is_null() { Value::from(0) } else { v.clone() });
        assert_eq!(
            evaluate(&defaulted, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::from(0))
        );
        assert!(evaluate(&defaulted, Mode::Safe, false).unwrap().is_broken());
    }

    #[test]
    fn call_receives_receiver_and_args() {
        let store = store();
        let picked = store.cursor().prop("users").call(
            "at",
            |this, args| {
                let index = args[0].as_i64().unwrap_or(0) as usize;
                this.as_array()
                    .and_then(|items| items.get(index).cloned())
                    .unwrap_or_default()
            },
            vec![Value::from(1)],
        );
        let name = picked.prop("name");
        assert_eq!(
            evaluate(&name, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::from("second"))
        );
    }

    #[test]
    fn call_with_cursor_context() {
        let store = store();
        let users = store.cursor().prop("users");
        let count = store.cursor().call_with(
            "count",
            CallContext::Cursor(users),
            |this, _| Value::from(this.len().unwrap_or(0) as i64),
            vec![],
        );
        assert_eq!(
            evaluate(&count, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::from(2))
        );
    }

    #[test]
    fn memo_avoids_rerunning_steps() {
        let store = store();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let traced = store.cursor().transform(move |v| {
            counter.set(counter.get() + 1);
            v.clone()
        });

        evaluate(&traced, Mode::Strict, false).unwrap();
        evaluate(&traced, Mode::Strict, false).unwrap();
        assert_eq!(runs.get(), 1);

        evaluate(&traced, Mode::Safe, false).unwrap();
        assert_eq!(runs.get(), 2);

        evaluate(&traced, Mode::Strict, true).unwrap();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn reads_of_another_store_are_never_stale() {
        let engine = Engine::default();
        let a = engine.create_store(Value::from(json!({"unused": true})));
        let b = engine.create_store(Value::from(json!({"n": 1})));
        let n = b.cursor().prop("n");
        let copied = a.cursor().call_with(
            "this",
            CallContext::Cursor(n.clone()),
            |this, _| this.clone(),
            vec![],
        );
        let doubled = a.cursor().call_with(
            "double",
            CallContext::Cursor(copied.clone()),
            |this, _| Value::from(this.as_i64().unwrap_or(0) * 2),
            vec![],
        );
        assert!(copied.is_external());
        assert!(doubled.is_external());
        assert!(copied.prop("x").is_external());

        assert_eq!(copied.get().unwrap(), Value::from(1));
        assert_eq!(doubled.get().unwrap(), Value::from(2));
        n.set(2).unwrap();
        assert_eq!(a.version(), 0);
        assert_eq!(copied.get().unwrap(), Value::from(2));
        assert_eq!(doubled.get().unwrap(), Value::from(4));
    }

    #[test]
    fn calls_on_the_same_store_stay_memoized() {
        let store = store();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let users = store.cursor().prop("users");
        let count = store.cursor().call_with(
            "count",
            CallContext::Cursor(users),
            move |this, _| {
                counter.set(counter.get() + 1);
                Value::from(this.len().unwrap_or(0) as i64)
            },
            vec![],
        );
        assert!(!count.is_external());

        evaluate(&count, Mode::Strict, false).unwrap();
        evaluate(&count, Mode::Strict, false).unwrap();
        assert_eq!(runs.get(), 1);

        store
            .cursor()
            .prop("users")
            .modify(|users| {
                if let Some(users) = users.as_array_mut() {
                    users.push(Value::from(json!({"name": "third"})));
                }
            })
            .unwrap();
        assert_eq!(
            evaluate(&count, Mode::Strict, false).unwrap(),
            SafeRead::Value(Value::from(3))
        );
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn memo_can_be_disabled() {
        let engine = Engine::new(EngineConfig {
            memoize: false,
            ..Default::default()
        });
        let store = engine.create_store(Value::from(1));
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let traced = store.cursor().transform(move |v| {
            counter.set(counter.get() + 1);
            v.clone()
        });

        evaluate(&traced, Mode::Strict, false).unwrap();
        evaluate(&traced, Mode::Strict, false).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn safe_read_same() {
        let v = Value::from(json!([1]));
        assert!(SafeRead::Value(v.clone()).same(&SafeRead::Value(v)));
        assert!(SafeRead::Broken.same(&SafeRead::Broken));
        assert!(!SafeRead::Broken.same(&SafeRead::Value(Value::Null)));
    }
}
