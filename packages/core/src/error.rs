//! Error types for the cursor engine.

use cursorstore_tree::TreeError;

/// Errors raised by cursors, stores and updates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value handed to an entry point is not a usable cursor here.
    #[error("invalid cursor: {message}")]
    InvalidCursor { message: String },

    /// A cursor or draft was used for an operation it does not support.
    #[error("structural misuse: {message}")]
    StructuralMisuse { message: String },

    /// The cursor contains a call or transform step, so there is no slot to
    /// write back to.
    #[error("cursor {cursor} is read-only: it contains a call or transform step")]
    ReadonlyTarget { cursor: String },

    /// Cancels the running update without surfacing an error to its caller.
    #[error("update rolled back")]
    Rollback,

    /// Any other failure raised from inside an update recipe.
    #[error("update recipe failed: {0}")]
    Recipe(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("cursor {cursor} has no parent")]
    NoParent { cursor: String },

    /// Patches are produced for whole trees, so only root cursors can carry
    /// a patch subscription.
    #[error("patch subscriptions require a root cursor, got {cursor}")]
    PatchSubscriptionScope { cursor: String },

    /// A strict read stepped into a null value.
    #[error("cannot apply '{step}' to null while reading {cursor}")]
    NullDereference { cursor: String, step: String },

    /// An in-place mutation addressed a location missing from the draft.
    #[error("nothing to modify at {cursor}")]
    MissingTarget { cursor: String },

    #[error("conversion failed: {message}")]
    Convert { message: String },

    #[error(transparent)]
    Tree(TreeError),
}

impl Error {
    /// Wrap a user error raised inside a recipe.
    pub fn recipe(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Recipe(err.into())
    }

    /// A recipe error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Recipe(message.into().into())
    }

    /// True for the rollback sentinel.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Error::Rollback)
    }

    /// A `StructuralMisuse` error with the given message.
    pub fn misuse(message: impl Into<String>) -> Self {
        Error::StructuralMisuse {
            message: message.into(),
        }
    }
}

impl From<TreeError> for Error {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Convert { message } => Error::Convert { message },
            other => Error::Tree(other),
        }
    }
}

/// The rollback sentinel.
///
/// Returning it from a recipe discards every change the update made, and
/// `update()` still returns `Ok(())`.
///
/// ```rust
/// use cursorstore_core::{rollback, Engine, Value};
///
/// let engine = Engine::default();
/// let store = engine.create_store(Value::from(1));
/// store
///     .cursor()
///     .update(|draft| {
///         draft.set(Value::from(2))?;
///         Err(rollback())
///     })
///     .unwrap();
/// assert_eq!(store.snapshot(), Value::from(1));
/// ```
pub fn rollback() -> Error {
    Error::Rollback
}
