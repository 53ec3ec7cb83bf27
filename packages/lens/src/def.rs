//! Lens definitions: named views and actions.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use cursorstore_core::{Error, Value};

use crate::LensInstance;

/// A view or action body. Receives the instance it runs on (to reach other
/// views and actions) and the call arguments.
pub type LensFn = Rc<dyn Fn(&LensInstance, &[Value]) -> Result<Value, Error>>;

/// The views and actions of a lens, as returned by its builder.
///
/// Views are read-only computations over the lens data. Actions run inside
/// an update of the lens cursor and may write to the data.
#[derive(Clone, Default)]
pub struct LensDef {
    pub(crate) views: BTreeMap<String, LensFn>,
    pub(crate) actions: BTreeMap<String, LensFn>,
}

impl LensDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view.
    #[must_use]
    pub fn view<F>(mut self, name: &str, view: F) -> Self
    where
        F: Fn(&LensInstance, &[Value]) -> Result<Value, Error> + 'static,
    {
        self.views.insert(name.to_string(), Rc::new(view));
        self
    }

    /// Add an action.
    #[must_use]
    pub fn action<F>(mut self, name: &str, action: F) -> Self
    where
        F: Fn(&LensInstance, &[Value]) -> Result<Value, Error> + 'static,
    {
        self.actions.insert(name.to_string(), Rc::new(action));
        self
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl fmt::Debug for LensDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensDef")
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
