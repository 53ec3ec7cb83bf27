//! Patches: serializable descriptions of single changes to a tree.

use serde::{Deserialize, Serialize};

use crate::{Key, Path, TreeError, Value};

/// What a patch does at its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a map entry or an array element (shifting later elements up).
    Add,
    /// Overwrite the value at the path.
    Replace,
    /// Delete a map entry or an array element (shifting later elements down).
    Remove,
}

/// A single change, addressed from the root of the tree it was produced for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    pub fn add(path: &[Key], value: Value) -> Self {
        Patch {
            op: PatchOp::Add,
            path: Path::from_keys(path.iter().cloned()),
            value: Some(value),
        }
    }

    pub fn replace(path: &[Key], value: Value) -> Self {
        Patch {
            op: PatchOp::Replace,
            path: Path::from_keys(path.iter().cloned()),
            value: Some(value),
        }
    }

    pub fn remove(path: &[Key]) -> Self {
        Patch {
            op: PatchOp::Remove,
            path: Path::from_keys(path.iter().cloned()),
            value: None,
        }
    }
}

/// Apply patches in order to `base`, producing a new tree.
///
/// `base` itself is untouched; branches the patches do not reach stay
/// shared with it.
pub fn apply_patches(base: &Value, patches: &[Patch]) -> Result<Value, TreeError> {
    let mut root = base.clone();
    for patch in patches {
        apply_patch(&mut root, patch)?;
    }
    Ok(root)
}

fn apply_patch(root: &mut Value, patch: &Patch) -> Result<(), TreeError> {
    let (Some(parent_path), Some(key)) = (patch.path.parent(), patch.path.last()) else {
        *root = match patch.op {
            PatchOp::Remove => Value::Null,
            PatchOp::Add | PatchOp::Replace => patch.value.clone().unwrap_or_default(),
        };
        return Ok(());
    };

    let parent = root
        .get_path_mut(&parent_path)
        .ok_or_else(|| TreeError::Missing {
            path: parent_path.clone(),
        })?;
    let value = patch.value.clone().unwrap_or_default();

    match patch.op {
        PatchOp::Replace => {
            parent.insert(key.clone(), value)?;
        }
        PatchOp::Add => match parent.as_array_mut() {
            Some(arr) => {
                let index = key
                    .as_index()
                    .ok_or_else(|| TreeError::InvalidIndex { key: key.clone() })?;
                if index > arr.len() {
                    return Err(TreeError::IndexOutOfBounds {
                        index,
                        len: arr.len(),
                    });
                }
                arr.insert(index, value);
            }
            None => {
                parent.insert(key.clone(), value)?;
            }
        },
        PatchOp::Remove => {
            if parent.remove(key)?.is_none() {
                return Err(TreeError::Missing {
                    path: patch.path.clone(),
                });
            }
        }
    }
    Ok(())
}
