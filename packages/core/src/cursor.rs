//! Cursors: lazy, composable handles to a location in a store.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use cursorstore_tree::{from_value, to_value, Key, Patch, Path, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::access::CursorAccess;
use crate::arena::{CursorId, Lease, Mode};
use crate::eval::{evaluate, SafeRead};
use crate::step::{CallContext, Step};
use crate::store::StoreInner;
use crate::update::{run_update, Draft, Outcome};
use crate::{Engine, Error, Store};

/// A path into a store.
///
/// Building a cursor never reads the tree: `prop`, `index`, `call` and
/// `transform` only extend the path. Reading goes through [`Cursor::get`] or
/// [`Cursor::safe_get`]; writing through [`Cursor::update`] and its sugar.
///
/// Cursors derived by the same key steps from the same parent are equal
/// (`==`) and hash alike. Call and transform steps always produce a new,
/// distinct cursor, whose descriptor is freed once the last clone of it
/// (and of every cursor derived from it) is dropped.
///
/// # Example
///
/// ```rust
/// use cursorstore_core::{Engine, Value};
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(serde_json::json!({
///     "users": [{"name": "first"}, {"name": "second"}]
/// })));
///
/// let name = store.cursor().prop("users").index(0).prop("name");
/// assert_eq!(name, store.cursor().prop("users").index(0).prop("name"));
/// assert_eq!(name.get().unwrap(), Value::from("first"));
///
/// name.set("renamed").unwrap();
/// assert_eq!(name.get().unwrap(), Value::from("renamed"));
/// assert_eq!(name.to_string(), "/users/0/name");
/// ```
#[derive(Clone)]
pub struct Cursor {
    pub(crate) store: Rc<StoreInner>,
    pub(crate) id: CursorId,
    /// Set when the descriptor is not addressable.
    pub(crate) lease: Option<Rc<Lease>>,
}

impl Cursor {
    fn extend(&self, step: Step) -> Cursor {
        let external = match &step {
            Step::Call {
                context: CallContext::Cursor(other),
                ..
            } => !other.same_store(self) || other.is_external(),
            _ => false,
        };

        let mut released = Vec::new();
        let (id, lease) = {
            let mut arena = self.store.arena.borrow_mut();
            for id in self.store.released.take() {
                released.push(arena.release(id));
            }
            let id = arena.child(self.id, step, external);
            let lease = arena.lease(&self.store, id, self.lease.clone());
            (id, lease)
        };
        drop(released);

        Cursor {
            store: self.store.clone(),
            id,
            lease,
        }
    }

    /// Step into a map field or array index.
    ///
    /// Fields named by a decimal number are the same step as the index, so
    /// `prop("0")` and `index(0)` yield one cursor.
    pub fn key(&self, key: impl Into<Key>) -> Cursor {
        self.extend(Step::Key(key.into().normalized()))
    }

    /// Step into a map field.
    pub fn prop(&self, name: &str) -> Cursor {
        self.key(Key::from(name))
    }

    /// Step into an array element.
    pub fn index(&self, index: usize) -> Cursor {
        self.key(Key::Index(index))
    }

    /// Step along every key of `path`.
    pub fn at(&self, path: &Path) -> Cursor {
        path.iter()
            .fold(self.clone(), |cursor, key| cursor.key(key.clone()))
    }

    /// Call `function` with the current value as `this`.
    ///
    /// The resulting cursor is functional and read-only.
    pub fn call<F>(&self, name: &str, function: F, args: Vec<Value>) -> Cursor
    where
        F: Fn(&Value, &[Value]) -> Value + 'static,
    {
        self.call_with(name, CallContext::Receiver, function, args)
    }

    /// Call `function` with `this` taken from `context`.
    pub fn call_with<F>(&self, name: &str, context: CallContext, function: F, args: Vec<Value>) -> Cursor
    where
        F: Fn(&Value, &[Value]) -> Value + 'static,
    {
        self.extend(Step::Call {
            name: name.to_string(),
            context,
            function: Rc::new(function),
            args,
        })
    }

    /// Apply a pure function to the current value. The resulting cursor is
    /// read-only.
    pub fn transform<F>(&self, transform: F) -> Cursor
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.extend(Step::Transform(Rc::new(transform)))
    }

    /// Read the current value.
    ///
    /// A missing key reads as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// [`Error::NullDereference`] when a step has to be applied to null.
    pub fn get(&self) -> Result<Value, Error> {
        let value = match evaluate(self, Mode::Strict, false)? {
            SafeRead::Value(value) => value,
            SafeRead::Broken => Value::Null,
        };
        self.report(SafeRead::Value(value.clone()));
        Ok(value)
    }

    /// Read the current value, yielding [`SafeRead::Broken`] instead of
    /// failing when the path runs through null.
    pub fn safe_get(&self) -> SafeRead {
        let result = self.peek();
        self.report(result.clone());
        result
    }

    /// Read and deserialize the current value.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(from_value(&self.get()?)?)
    }

    /// A safe read that is not reported on the access bus.
    pub(crate) fn peek(&self) -> SafeRead {
        evaluate(self, Mode::Safe, false).unwrap_or_else(|err| {
            tracing::warn!(cursor = %self, error = %err, "safe read failed");
            SafeRead::Broken
        })
    }

    fn report(&self, value: SafeRead) {
        let access = &self.store.engine.access;
        if !access.is_empty() {
            access.emit(&CursorAccess {
                cursor: self.clone(),
                value,
            });
        }
    }

    /// Run `recipe` against a draft of this cursor's location and commit the
    /// result as a new snapshot.
    ///
    /// All-or-nothing: if the recipe fails, the store is left untouched and
    /// the error returned, except for [`Error::Rollback`] which is swallowed.
    /// Updates started from inside a recipe share the outer draft and commit
    /// with it.
    ///
    /// # Errors
    ///
    /// [`Error::ReadonlyTarget`] for cursors with call or transform steps,
    /// before any draft is opened.
    pub fn update<F>(&self, recipe: F) -> Result<(), Error>
    where
        F: FnOnce(&Draft) -> Result<Outcome, Error>,
    {
        run_update(self, recipe)
    }

    /// Mutate the addressed value in place.
    pub fn modify<F>(&self, mutate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Value),
    {
        self.update(|draft| {
            draft.modify(mutate)?;
            Ok(Outcome::Mutated)
        })
    }

    /// Replace the addressed value.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        self.update(|_| Ok(Outcome::Replaced(value)))
    }

    /// Serialize `data` and store it here.
    pub fn set_as<T: Serialize>(&self, data: &T) -> Result<(), Error> {
        self.set(to_value(data)?)
    }

    /// Remove the addressed map entry (arrays keep their length and get a
    /// null in the slot).
    pub fn remove(&self) -> Result<(), Error> {
        self.update(|_| Ok(Outcome::Absent))
    }

    /// Apply patches produced for this store, e.g. inverse patches to undo
    /// an update. Only valid on the root cursor.
    pub fn apply_patches(&self, patches: &[Patch]) -> Result<(), Error> {
        if !self.is_root() {
            return Err(Error::misuse(format!(
                "patches can only be applied at the root, not at {}",
                self
            )));
        }
        self.update(|draft| {
            let next = cursorstore_tree::apply_patches(&draft.get()?, patches)?;
            draft.set(next)?;
            Ok(Outcome::Mutated)
        })
    }

    /// The cursor one step up.
    pub fn parent(&self) -> Result<Cursor, Error> {
        let parent = self.store.arena.borrow().node(self.id).parent;
        parent
            .map(|id| Cursor {
                store: self.store.clone(),
                id,
                lease: self.lease.as_ref().and_then(|lease| lease.parent()),
            })
            .ok_or_else(|| Error::NoParent {
                cursor: self.to_string(),
            })
    }

    pub fn has_parent(&self) -> bool {
        self.id != CursorId::ROOT
    }

    pub fn is_root(&self) -> bool {
        self.id == CursorId::ROOT
    }

    /// True if any step is a call.
    pub fn is_functional(&self) -> bool {
        self.store.arena.borrow().node(self.id).functional
    }

    /// True if every step is a key, so the cursor can be written through.
    pub fn is_addressable(&self) -> bool {
        self.store.arena.borrow().node(self.id).addressable
    }

    /// The steps from the root to this cursor.
    pub fn steps(&self) -> Vec<Step> {
        self.store.arena.borrow().node(self.id).steps.clone()
    }

    /// The key path of an addressable cursor.
    pub fn path(&self) -> Option<Path> {
        let arena = self.store.arena.borrow();
        let node = arena.node(self.id);
        if !node.addressable {
            return None;
        }
        Some(
            node.steps
                .iter()
                .filter_map(|step| step.as_key().cloned())
                .collect(),
        )
    }

    pub fn store(&self) -> Store {
        Store {
            inner: self.store.clone(),
        }
    }

    pub fn engine(&self) -> Engine {
        Engine {
            inner: self.store.engine.clone(),
        }
    }

    pub(crate) fn same_store(&self, other: &Cursor) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// Reads depend on a store other than this cursor's.
    pub(crate) fn is_external(&self) -> bool {
        self.store.arena.borrow().node(self.id).external
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.same_store(other) && self.id == other.id
    }
}

impl Eq for Cursor {}

impl Hash for Cursor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.store).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.store.arena.borrow();
        let steps = &arena.node(self.id).steps;
        if steps.is_empty() {
            return write!(f, "/");
        }
        for step in steps {
            write!(f, "/{}", step)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({} in store {})", self, self.store.id)
    }
}
