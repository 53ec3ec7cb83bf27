//! The structural-sharing primitive.
//!
//! A draft is a plain clone of the base tree: writes through
//! [`Value::get_mut`] and friends copy each touched container once and leave
//! the base alone. [`finalize`] then walks base and draft side by side, only
//! descending where the two stopped sharing, and
//!
//! - records forward and inverse [`Patch`]es for every real difference,
//! - hands back the base's own containers wherever the draft ended up with
//!   equal contents, so a recipe that touched a branch without changing it
//!   does not produce a new snapshot of that branch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Key, Patch, Value};

/// The outcome of finishing a draft.
#[derive(Clone, Debug)]
pub struct Produced {
    /// The new root. `same` as the base when nothing changed.
    pub root: Value,
    pub patches: Vec<Patch>,
    pub inverse_patches: Vec<Patch>,
}

impl Produced {
    /// True when the draft did not differ from its base.
    pub fn is_unchanged(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Run `recipe` against a draft of `base` and finalize the result.
///
/// If the recipe fails the draft is dropped and the error returned; `base`
/// is never modified.
///
/// ```rust
/// use cursorstore_tree::{produce, path, Value};
///
/// let base = Value::from(serde_json::json!({"a": {"x": 1}, "b": {"y": 2}}));
/// let produced = produce(&base, |draft| {
///     *draft.get_path_mut(&path!("a/x")).unwrap() = Value::from(5);
///     Ok::<_, ()>(())
/// })
/// .unwrap();
///
/// assert_eq!(produced.patches.len(), 1);
/// assert!(produced.root.get_path(&path!("b")).unwrap().same(base.get_path(&path!("b")).unwrap()));
/// ```
pub fn produce<F, E>(base: &Value, recipe: F) -> Result<Produced, E>
where
    F: FnOnce(&mut Value) -> Result<(), E>,
{
    let mut draft = base.clone();
    recipe(&mut draft)?;
    Ok(finalize(base, draft))
}

/// Compare a finished draft against its base.
pub fn finalize(base: &Value, draft: Value) -> Produced {
    let mut reconciler = Reconciler::default();
    let root = reconciler.reconcile(base, draft, &mut Vec::new());
    Produced {
        root,
        patches: reconciler.patches,
        inverse_patches: reconciler.inverse_patches,
    }
}

#[derive(Default)]
struct Reconciler {
    patches: Vec<Patch>,
    inverse_patches: Vec<Patch>,
}

impl Reconciler {
    fn reconcile(&mut self, base: &Value, draft: Value, path: &mut Vec<Key>) -> Value {
        if base.same(&draft) {
            return base.clone();
        }

        match (base, &draft) {
            (Value::Map(old), Value::Map(new)) => self.reconcile_map(base, old, new, path),
            (Value::Array(old), Value::Array(new)) => self.reconcile_array(base, old, new, path),
            _ => {
                self.patches.push(Patch::replace(path, draft.clone()));
                self.inverse_patches.push(Patch::replace(path, base.clone()));
                draft
            }
        }
    }

    fn reconcile_map(
        &mut self,
        base: &Value,
        old: &BTreeMap<String, Value>,
        new: &BTreeMap<String, Value>,
        path: &mut Vec<Key>,
    ) -> Value {
        let mut changed = false;
        let mut out = BTreeMap::new();

        for (name, new_child) in new {
            path.push(Key::Field(name.clone()));
            let child = match old.get(name) {
                Some(old_child) => {
                    let child = self.reconcile(old_child, new_child.clone(), path);
                    changed |= !child.same(old_child);
                    child
                }
                None => {
                    self.patches.push(Patch::add(path, new_child.clone()));
                    self.inverse_patches.push(Patch::remove(path));
                    changed = true;
                    new_child.clone()
                }
            };
            path.pop();
            out.insert(name.clone(), child);
        }

        for (name, old_child) in old {
            if !new.contains_key(name) {
                path.push(Key::Field(name.clone()));
                self.patches.push(Patch::remove(path));
                self.inverse_patches.push(Patch::add(path, old_child.clone()));
                path.pop();
                changed = true;
            }
        }

        if changed {
            Value::Map(Arc::new(out))
        } else {
            base.clone()
        }
    }

    fn reconcile_array(
        &mut self,
        base: &Value,
        old: &[Value],
        new: &[Value],
        path: &mut Vec<Key>,
    ) -> Value {
        let common = old.len().min(new.len());
        let mut changed = old.len() != new.len();
        let mut out = Vec::with_capacity(new.len());

        for i in 0..common {
            path.push(Key::Index(i));
            let child = self.reconcile(&old[i], new[i].clone(), path);
            changed |= !child.same(&old[i]);
            out.push(child);
            path.pop();
        }

        // Grown: append ascending, undo by removing from the end.
        for (i, item) in new.iter().enumerate().skip(common) {
            path.push(Key::Index(i));
            self.patches.push(Patch::add(path, item.clone()));
            path.pop();
            out.push(item.clone());
        }
        for i in (common..new.len()).rev() {
            path.push(Key::Index(i));
            self.inverse_patches.push(Patch::remove(path));
            path.pop();
        }

        // Shrunk: remove from the end, undo by re-adding ascending.
        for i in (common..old.len()).rev() {
            path.push(Key::Index(i));
            self.patches.push(Patch::remove(path));
            path.pop();
        }
        for (i, item) in old.iter().enumerate().skip(common) {
            path.push(Key::Index(i));
            self.inverse_patches.push(Patch::add(path, item.clone()));
            path.pop();
        }

        if changed {
            Value::Array(Arc::new(out))
        } else {
            base.clone()
        }
    }
}
