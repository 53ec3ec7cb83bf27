//! Persistent data trees with structural sharing.
//!
//! This is the data layer under the cursor engine:
//! - `Value`: an immutable tree whose containers are shared between snapshots
//! - `Key` / `Path`: addresses of nodes inside a tree
//! - `produce` / `finalize`: turn a mutated draft into a new snapshot plus
//!   forward and inverse `Patch`es, keeping untouched branches shared
//! - `apply_patches`: replay patches (e.g. inverse patches for undo)
//!
//! # Example
//!
//! ```rust
//! use cursorstore_tree::{produce, path, Value};
//!
//! let base = Value::from(serde_json::json!({"users": [{"name": "first"}]}));
//! let produced = produce(&base, |draft| {
//!     *draft.get_path_mut(&path!("users/0/name")).unwrap() = Value::from("renamed");
//!     Ok::<_, ()>(())
//! })
//! .unwrap();
//!
//! assert_eq!(produced.root.get_path(&path!("users/0/name")), Some(&Value::from("renamed")));
//! assert_eq!(base.get_path(&path!("users/0/name")), Some(&Value::from("first")));
//! ```

mod convert;
mod error;
mod patch;
mod path;
mod produce;
mod value;

pub use convert::{from_value, json_to_value, to_value, value_to_json};
pub use error::TreeError;
pub use patch::{apply_patches, Patch, PatchOp};
pub use path::{Key, Path, PathError};
pub use produce::{finalize, produce, Produced};
pub use value::Value;
