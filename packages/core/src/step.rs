//! Path steps.

use std::fmt;
use std::rc::Rc;

use cursorstore_tree::{Key, Value};

use crate::Cursor;

/// A function invoked by a call step: `(this, args) -> result`.
pub type CallFn = Rc<dyn Fn(&Value, &[Value]) -> Value>;

/// A pure function applied to the current value by a transform step.
pub type TransformFn = Rc<dyn Fn(&Value) -> Value>;

/// Where a call step gets its `this` value from.
#[derive(Clone)]
pub enum CallContext {
    /// The value the cursor addresses just before the call.
    Receiver,
    /// The value of another cursor, read in the same mode as the call.
    Cursor(Cursor),
    /// A fixed value.
    Value(Value),
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallContext::Receiver => write!(f, "Receiver"),
            CallContext::Cursor(cursor) => write!(f, "Cursor({})", cursor),
            CallContext::Value(value) => write!(f, "Value({:?})", value),
        }
    }
}

/// One step of a cursor's path. Immutable once created.
#[derive(Clone)]
pub enum Step {
    /// Member access by field name or index.
    Key(Key),
    /// A function call.
    Call {
        name: String,
        context: CallContext,
        function: CallFn,
        args: Vec<Value>,
    },
    /// A pure function of the current value.
    Transform(TransformFn),
}

impl Step {
    pub fn is_call(&self) -> bool {
        matches!(self, Step::Call { .. })
    }

    /// Only key steps address a slot that can be written back to.
    pub fn is_addressable(&self) -> bool {
        matches!(self, Step::Key(_))
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Step::Key(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(key) => write!(f, "{}", key),
            Step::Call { name, .. } => write!(f, "{}(...)", name),
            Step::Transform(_) => write!(f, "<transform>"),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Step::Call {
                name,
                context,
                args,
                ..
            } => f
                .debug_struct("Call")
                .field("name", name)
                .field("context", context)
                .field("args", args)
                .finish_non_exhaustive(),
            Step::Transform(_) => f.write_str("Transform"),
        }
    }
}

impl From<Key> for Step {
    fn from(key: Key) -> Self {
        Step::Key(key)
    }
}
