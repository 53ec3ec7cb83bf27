//! Error types for tree manipulation.

use crate::{Key, Path, PathError};

/// Errors raised while writing into a [`Value`](crate::Value) tree or
/// converting it to and from other representations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// Path validation error.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// A child was assigned on a value that has no children.
    #[error("cannot set child '{key}' on non-container value")]
    NotAContainer { key: Key },

    /// A non-numeric key was used on an array.
    #[error("invalid array index: {key}")]
    InvalidIndex { key: Key },

    /// An array index past the end (writes may only append at `len`).
    #[error("array index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A patch addressed a location that does not exist.
    #[error("no value at '{path}'")]
    Missing { path: Path },

    /// Conversion to or from a typed representation failed.
    #[error("conversion error: {message}")]
    Convert { message: String },
}
