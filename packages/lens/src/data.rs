//! The data a lens's views and actions see.
//!
//! A lens reads through a data source that depends on what is running:
//! views get the committed snapshot taken when they were entered, actions get
//! the store's open draft, and anything else falls through to the cursor.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use cursorstore_core::{Cursor, Draft, Error, Key, Outcome, Value};

#[derive(Clone, Debug)]
pub(crate) enum DataSource {
    /// No view or action is running: read the cursor.
    Live,
    /// A view is running outside any action.
    Snapshot(Value),
    /// An action is running: read and write the draft.
    Draft(Draft),
}

#[derive(Debug)]
pub(crate) struct LensState {
    pub(crate) cursor: Cursor,
    source: RefCell<DataSource>,
    view_depth: Cell<usize>,
}

impl LensState {
    pub(crate) fn new(cursor: Cursor) -> Rc<Self> {
        Rc::new(Self {
            cursor,
            source: RefCell::new(DataSource::Live),
            view_depth: Cell::new(0),
        })
    }

    pub(crate) fn in_action(&self) -> bool {
        matches!(*self.source.borrow(), DataSource::Draft(_))
    }

    pub(crate) fn in_view(&self) -> bool {
        self.view_depth.get() > 0
    }

    /// Run `f` with `source` installed, restoring the previous source after.
    pub(crate) fn with_source<R>(&self, source: DataSource, f: impl FnOnce() -> R) -> R {
        let previous = self.source.replace(source);
        let _restore = Restore {
            state: self,
            previous: Some(previous),
        };
        f()
    }

    /// Run `f` as a view body.
    pub(crate) fn as_view<R>(&self, f: impl FnOnce() -> R) -> R {
        self.view_depth.set(self.view_depth.get() + 1);
        let _leave = LeaveView(self);
        f()
    }

    /// Run `f` inside an update of the lens cursor with the draft installed.
    pub(crate) fn run_action<R>(&self, f: impl FnOnce() -> Result<R, Error>) -> Result<Option<R>, Error> {
        if self.in_view() && self.cursor.engine().config().dev_mode {
            return Err(Error::misuse(format!(
                "views of the lens at {} cannot run actions",
                self.cursor
            )));
        }

        let mut result = None;
        self.cursor.update(|draft| {
            let value = self.with_source(DataSource::Draft(draft.clone()), f)?;
            result = Some(value);
            Ok(Outcome::Mutated)
        })?;
        Ok(result)
    }

    fn read(&self) -> Result<Value, Error> {
        let source = self.source.borrow().clone();
        match source {
            DataSource::Live => self.cursor.get(),
            DataSource::Snapshot(value) => Ok(value),
            DataSource::Draft(draft) => draft.get(),
        }
    }

    fn draft(&self) -> Result<Draft, Error> {
        match &*self.source.borrow() {
            DataSource::Draft(draft) => Ok(draft.clone()),
            _ => Err(Error::misuse(format!(
                "the lens at {} can only be written inside an action",
                self.cursor
            ))),
        }
    }
}

struct Restore<'a> {
    state: &'a LensState,
    previous: Option<DataSource>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.state.source.replace(previous);
        }
    }
}

struct LeaveView<'a>(&'a LensState);

impl Drop for LeaveView<'_> {
    fn drop(&mut self) {
        self.0.view_depth.set(self.0.view_depth.get().saturating_sub(1));
    }
}

/// Handle to a lens instance's data, passed to the lens builder.
///
/// Reads see the snapshot inside views and the draft inside actions. Writes
/// are only accepted inside actions.
#[derive(Clone)]
pub struct LensData {
    state: Rc<LensState>,
}

impl LensData {
    pub(crate) fn new(state: Rc<LensState>) -> Self {
        Self { state }
    }

    /// The cursor this data belongs to.
    pub fn cursor(&self) -> &Cursor {
        &self.state.cursor
    }

    /// The whole value.
    pub fn get(&self) -> Result<Value, Error> {
        self.state.read()
    }

    /// One entry of the value; null when missing.
    pub fn field(&self, key: impl Into<Key>) -> Result<Value, Error> {
        let key = key.into();
        Ok(self.get()?.get(&key).cloned().unwrap_or_default())
    }

    /// Mutate the value in place.
    ///
    /// # Errors
    ///
    /// [`Error::StructuralMisuse`] outside an action.
    pub fn modify<R>(&self, mutate: impl FnOnce(&mut Value) -> R) -> Result<R, Error> {
        self.state.draft()?.modify(mutate)
    }

    /// Replace the value.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), Error> {
        self.state.draft()?.set(value)
    }

    /// Store `value` under `key`.
    pub fn set_field(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), Error> {
        let key = key.into();
        let value = value.into();
        self.modify(|data| data.insert(key, value))??;
        Ok(())
    }
}

impl fmt::Debug for LensData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensData")
            .field("cursor", &self.state.cursor)
            .finish()
    }
}

/// Runs ad-hoc code as an action of the lens, outside any named action.
#[derive(Clone)]
pub struct RunInAction {
    state: Rc<LensState>,
}

impl RunInAction {
    pub(crate) fn new(state: Rc<LensState>) -> Self {
        Self { state }
    }

    /// Run `f` inside an update of the lens cursor. Returns `None` when `f`
    /// rolled the update back.
    pub fn run<R>(&self, f: impl FnOnce() -> Result<R, Error>) -> Result<Option<R>, Error> {
        self.state.run_action(f)
    }
}

impl fmt::Debug for RunInAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunInAction")
            .field("cursor", &self.state.cursor)
            .finish()
    }
}
