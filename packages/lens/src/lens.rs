//! Lens factories and the instances they bind to cursors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use cursorstore_core::{subscribe_to, Cursor, CursorChange, Disposer, Error, Key, Value};

use crate::data::{DataSource, LensData, LensState, RunInAction};
use crate::def::{LensDef, LensFn};

type Builder = dyn Fn(&LensData, &RunInAction) -> LensDef;

/// Create a lens from a definition builder.
///
/// The builder runs once per cursor the lens is bound to. It receives the
/// instance's [`LensData`] and a [`RunInAction`] handle, which the view and
/// action closures it returns usually capture.
///
/// ```rust
/// use cursorstore_core::{Engine, Value};
/// use cursorstore_lens::{lens, LensDef};
///
/// let counter = lens(|data, _| {
///     let read = data.clone();
///     let write = data.clone();
///     LensDef::new()
///         .view("doubled", move |_, _| {
///             let n = read.get()?.as_i64().unwrap_or(0);
///             Ok(Value::from(n * 2))
///         })
///         .action("increment", move |_, _| {
///             let n = write.get()?.as_i64().unwrap_or(0);
///             write.set(n + 1)?;
///             Ok(Value::Null)
///         })
/// });
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(1));
/// let instance = counter.instance(&store.cursor());
/// instance.action("increment", &[]).unwrap();
/// assert_eq!(instance.view("doubled", &[]).unwrap(), Value::from(4));
/// ```
pub fn lens<F>(builder: F) -> Lens
where
    F: Fn(&LensData, &RunInAction) -> LensDef + 'static,
{
    Lens {
        inner: Rc::new(LensInner {
            builder: Box::new(builder),
            instances: RefCell::new(HashMap::new()),
        }),
    }
}

/// A lens factory: binds one definition to any number of cursors.
///
/// Instances are cached per cursor, so binding the same cursor twice yields
/// the same instance. The cache holds its cursors (and so their stores)
/// until they are evicted or the lens is dropped.
#[derive(Clone)]
pub struct Lens {
    inner: Rc<LensInner>,
}

struct LensInner {
    builder: Box<Builder>,
    instances: RefCell<HashMap<Cursor, LensInstance>>,
}

impl Lens {
    /// The instance bound to `cursor`, created on first use.
    pub fn instance(&self, cursor: &Cursor) -> LensInstance {
        if let Some(instance) = self.inner.instances.borrow().get(cursor) {
            return instance.clone();
        }

        // The builder may bind other instances of this lens.
        let instance = LensInstance::build(cursor.clone(), &*self.inner.builder);
        tracing::trace!(cursor = %cursor, "lens instance created");
        self.inner
            .instances
            .borrow_mut()
            .entry(cursor.clone())
            .or_insert(instance)
            .clone()
    }

    /// Drop the cached instance for `cursor`. Returns whether one existed.
    pub fn evict(&self, cursor: &Cursor) -> bool {
        let evicted = self.inner.instances.borrow_mut().remove(cursor).is_some();
        if evicted {
            tracing::debug!(cursor = %cursor, "lens instance evicted");
        }
        evicted
    }

    /// Drop every cached instance.
    pub fn clear(&self) {
        let instances = std::mem::take(&mut *self.inner.instances.borrow_mut());
        tracing::debug!(count = instances.len(), "lens instances cleared");
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        self.inner.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens").field("instances", &self.len()).finish()
    }
}

/// A lens bound to one cursor.
///
/// Views read a consistent snapshot of the cursor's value: outside an
/// action that is the committed value, inside one it is the draft. Argument
/// free views are cached per store version. Actions run inside an update of
/// the cursor, so everything they do commits (and notifies) once.
#[derive(Clone)]
pub struct LensInstance {
    inner: Rc<InstanceInner>,
}

struct InstanceInner {
    state: Rc<LensState>,
    def: LensDef,
    views: RefCell<HashMap<String, (u64, Value)>>,
}

impl LensInstance {
    fn build(cursor: Cursor, builder: &Builder) -> Self {
        let state = LensState::new(cursor);
        let def = builder(&LensData::new(state.clone()), &RunInAction::new(state.clone()));
        Self {
            inner: Rc::new(InstanceInner {
                state,
                def,
                views: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The cursor this instance is bound to.
    pub fn cursor(&self) -> &Cursor {
        &self.inner.state.cursor
    }

    /// The cursor's current value.
    pub fn data(&self) -> Result<Value, Error> {
        self.cursor().get()
    }

    pub fn definition(&self) -> &LensDef {
        &self.inner.def
    }

    /// Evaluate a view.
    ///
    /// # Errors
    ///
    /// [`Error::StructuralMisuse`] for an unknown view, or when the view
    /// tries to write. Errors raised by the view itself are returned as is.
    pub fn view(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let view = self.lookup(&self.inner.def.views, "view", name)?;
        let state = &self.inner.state;

        if state.in_action() {
            return state.as_view(|| view(self, args));
        }

        let snapshot = self.cursor().get()?;
        let version = self.cursor().store().version();
        let cacheable = args.is_empty();
        if cacheable {
            if let Some((cached_version, value)) = self.inner.views.borrow().get(name) {
                if *cached_version == version {
                    tracing::trace!(cursor = %self.cursor(), view = name, "lens view cache hit");
                    return Ok(value.clone());
                }
            }
        }

        let value = state.with_source(DataSource::Snapshot(snapshot), || {
            state.as_view(|| view(self, args))
        })?;
        if cacheable && self.cursor().store().version() == version {
            self.inner
                .views
                .borrow_mut()
                .insert(name.to_string(), (version, value.clone()));
        }
        Ok(value)
    }

    /// Run an action inside an update of the cursor and return its result.
    ///
    /// A rolled back action returns null.
    pub fn action(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let action = self.lookup(&self.inner.def.actions, "action", name)?;
        let result = self.inner.state.run_action(|| action(self, args))?;
        Ok(result.unwrap_or_default())
    }

    /// Run a view or an action, whichever `name` refers to.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        if self.inner.def.has_view(name) {
            self.view(name, args)
        } else {
            self.action(name, args)
        }
    }

    /// Read one entry of the cursor's value; null when missing.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value, Error> {
        let key = key.into();
        Ok(self.data()?.get(&key).cloned().unwrap_or_default())
    }

    /// The keys of the cursor's value.
    pub fn keys(&self) -> Result<Vec<Key>, Error> {
        Ok(self.data()?.keys())
    }

    /// Whether `key` is a view, an action, or an entry of the value.
    pub fn has(&self, key: impl Into<Key>) -> Result<bool, Error> {
        let key = key.into();
        if let Key::Field(name) = &key {
            if self.inner.def.has_view(name) || self.inner.def.has_action(name) {
                return Ok(true);
            }
        }
        Ok(self.data()?.get(&key).is_some())
    }

    fn lookup(
        &self,
        table: &std::collections::BTreeMap<String, LensFn>,
        kind: &str,
        name: &str,
    ) -> Result<LensFn, Error> {
        table.get(name).cloned().ok_or_else(|| {
            Error::misuse(format!(
                "the lens at {} has no {} named {:?}",
                self.cursor(),
                kind,
                name
            ))
        })
    }
}

impl PartialEq for LensInstance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for LensInstance {}

impl fmt::Debug for LensInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensInstance")
            .field("cursor", self.cursor())
            .field("def", &self.inner.def)
            .finish()
    }
}

/// Subscribe to changes of the value behind a lens instance.
pub fn subscribe_to_lens<F>(instance: &LensInstance, listener: F) -> Disposer
where
    F: Fn(&CursorChange) + 'static,
{
    subscribe_to(instance.cursor(), listener)
}
