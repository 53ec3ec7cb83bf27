//! The update protocol: drafts, recipes, commit and rollback.

use std::rc::Rc;

use cursorstore_tree::{finalize, Path, Produced, Value};

use crate::arena::Mode;
use crate::eval::{evaluate, SafeRead};
use crate::store::{PatchEvent, StoreChanged, StoreInner};
use crate::{Cursor, Error};

/// What a recipe did to its draft.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The draft was changed in place (or not at all).
    Mutated,
    /// Store this value at the cursor's location.
    Replaced(Value),
    /// Remove the cursor's location: map entries are deleted, array slots
    /// become null.
    Absent,
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Replaced(value)
    }
}

/// The mutable view of a cursor's location handed to a recipe.
///
/// The draft belongs to the store, not to this handle: a `Draft` only
/// borrows it for the duration of a [`Draft::modify`] closure, so recipes
/// can run nested updates and read other cursors between mutations.
#[derive(Clone, Debug)]
pub struct Draft {
    cursor: Cursor,
}

impl Draft {
    pub(crate) fn new(cursor: Cursor) -> Self {
        Self { cursor }
    }

    /// The cursor this draft was opened for.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// The current draft value at this location.
    pub fn get(&self) -> Result<Value, Error> {
        self.read(&self.cursor)
    }

    /// Read another cursor of the same store against the draft.
    pub fn read(&self, cursor: &Cursor) -> Result<Value, Error> {
        if !cursor.same_store(&self.cursor) {
            return Err(Error::InvalidCursor {
                message: format!("{:?} does not belong to the store being updated", cursor),
            });
        }
        match evaluate(cursor, Mode::Strict, true)? {
            SafeRead::Value(value) => Ok(value),
            SafeRead::Broken => Ok(Value::Null),
        }
    }

    /// A draft for another location of the same store.
    pub fn at(&self, cursor: &Cursor) -> Result<Draft, Error> {
        if !cursor.same_store(&self.cursor) {
            return Err(Error::InvalidCursor {
                message: format!("{:?} does not belong to the store being updated", cursor),
            });
        }
        if !cursor.is_addressable() {
            return Err(Error::ReadonlyTarget {
                cursor: cursor.to_string(),
            });
        }
        Ok(Draft::new(cursor.clone()))
    }

    /// Mutate the draft value at this location.
    ///
    /// # Errors
    ///
    /// [`Error::MissingTarget`] if nothing exists at the location (including
    /// a path running through null), [`Error::StructuralMisuse`] if no
    /// update is running or the draft is already borrowed by an enclosing
    /// `modify`.
    pub fn modify<R>(&self, mutate: impl FnOnce(&mut Value) -> R) -> Result<R, Error> {
        let location = self.location()?;
        let mut slot = self.cursor.store.draft_mut()?;
        let root = slot
            .as_mut()
            .ok_or_else(|| Error::misuse("no update is running"))?;
        let target = root
            .get_path_mut(&location)
            .ok_or_else(|| Error::MissingTarget {
                cursor: self.cursor.to_string(),
            })?;
        Ok(mutate(target))
    }

    /// Store `value` at this location.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), Error> {
        self.write(Some(value.into()))
    }

    /// Remove this location, as [`Outcome::Absent`] does.
    pub fn remove(&self) -> Result<(), Error> {
        self.write(None)
    }

    fn location(&self) -> Result<Path, Error> {
        self.cursor.path().ok_or_else(|| Error::ReadonlyTarget {
            cursor: self.cursor.to_string(),
        })
    }

    fn write(&self, value: Option<Value>) -> Result<(), Error> {
        let location = self.location()?;
        let mut slot = self.cursor.store.draft_mut()?;
        let root = slot
            .as_mut()
            .ok_or_else(|| Error::misuse("no update is running"))?;

        let (Some(parent_path), Some(key)) = (location.parent(), location.last()) else {
            *root = value.unwrap_or_default();
            return Ok(());
        };
        let parent = root
            .get_path_mut(&parent_path)
            .ok_or_else(|| Error::MissingTarget {
                cursor: self.cursor.to_string(),
            })?;

        match value {
            Some(value) => {
                parent.insert(key.clone(), value)?;
            }
            None if parent.is_array() => {
                if let Some(slot) = parent.get_mut(key) {
                    *slot = Value::Null;
                }
            }
            None => {
                parent.remove(key)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn run_update<F>(cursor: &Cursor, recipe: F) -> Result<(), Error>
where
    F: FnOnce(&Draft) -> Result<Outcome, Error>,
{
    if !cursor.is_addressable() {
        return Err(Error::ReadonlyTarget {
            cursor: cursor.to_string(),
        });
    }

    let store = &cursor.store;
    if store.is_updating() {
        tracing::trace!(store = store.id, cursor = %cursor, "nested update reuses the open draft");
        return apply_recipe(cursor, recipe);
    }

    let engine = store.engine.clone();
    let _batch = engine.begin_batch();

    *store.draft_mut()? = Some(store.root.borrow().clone());
    let reset = DraftReset(store);

    let result = apply_recipe(cursor, recipe);

    let draft = store.draft_mut()?.take();
    if store.update_cancelled.get() {
        tracing::debug!(store = store.id, cursor = %cursor, "update cancelled");
    } else if let Some(draft) = draft {
        let base = store.root.borrow().clone();
        commit(store, finalize(&base, draft));
    }

    // The store must be idle again before the batch closes and listeners run.
    drop(reset);
    result
}

fn apply_recipe<F>(cursor: &Cursor, recipe: F) -> Result<(), Error>
where
    F: FnOnce(&Draft) -> Result<Outcome, Error>,
{
    let draft = Draft::new(cursor.clone());
    let result = recipe(&draft).and_then(|outcome| match outcome {
        Outcome::Mutated => Ok(()),
        Outcome::Replaced(value) => draft.set(value),
        Outcome::Absent => draft.remove(),
    });

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            cursor.store.update_cancelled.set(true);
            if err.is_rollback() {
                tracing::debug!(store = cursor.store.id, cursor = %cursor, "update rolled back");
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn commit(store: &Rc<StoreInner>, produced: Produced) {
    if produced.root.same(&store.root.borrow()) {
        tracing::trace!(store = store.id, "update left the root unchanged");
        return;
    }

    let version = store.version.get() + 1;
    *store.root.borrow_mut() = produced.root;
    store.version.set(version);
    tracing::debug!(
        store = store.id,
        version,
        patches = produced.patches.len(),
        "committed update"
    );

    let engine = &store.engine;
    if !store.patches.is_empty() {
        let listeners = store.patches.clone();
        let Produced {
            patches,
            inverse_patches,
            ..
        } = produced;
        engine.run_when_outside_transaction(move |transaction_id| {
            listeners.emit(&PatchEvent {
                patches,
                inverse_patches,
                transaction_id,
            })
        });
    }

    let listeners = store.changes.clone();
    engine.run_when_outside_transaction(move |transaction_id| {
        listeners.emit(&StoreChanged {
            version,
            transaction_id,
        })
    });
}

/// Returns the store to idle, whatever the recipe did.
struct DraftReset<'a>(&'a StoreInner);

impl Drop for DraftReset<'_> {
    fn drop(&mut self) {
        if let Ok(mut draft) = self.0.draft.try_borrow_mut() {
            *draft = None;
        }
        self.0.update_cancelled.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rollback, Engine, Store};
    use serde_json::json;

    fn store() -> Store {
        Engine::default().create_store(Value::from(json!({
            "users": [{"name": "first"}, {"name": "second"}],
            "count": 1
        })))
    }

    #[test]
    fn replace_at_key() {
        let store = store();
        let count = store.cursor().prop("count");
        count.update(|_| Ok(Outcome::Replaced(Value::from(2)))).unwrap();
        assert_eq!(count.get().unwrap(), Value::from(2));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn mutate_in_place() {
        let store = store();
        let users = store.cursor().prop("users");
        users
            .update(|draft| {
                draft.modify(|v| {
                    if let Some(items) = v.as_array_mut() {
                        items.push(Value::from(json!({"name": "third"})));
                    }
                })?;
                Ok(Outcome::Mutated)
            })
            .unwrap();
        assert_eq!(users.index(2).prop("name").get().unwrap(), Value::from("third"));
    }

    #[test]
    fn replace_root() {
        let store = store();
        store.cursor().set(Value::from(5)).unwrap();
        assert_eq!(store.snapshot(), Value::from(5));
    }

    #[test]
    fn absent_removes_map_entries_and_nulls_array_slots() {
        let store = store();
        store.cursor().prop("count").remove().unwrap();
        assert_eq!(store.snapshot().as_map().unwrap().get("count"), None);

        store.cursor().prop("users").index(0).remove().unwrap();
        let users = store.cursor().prop("users").get().unwrap();
        assert_eq!(users.len(), Some(2));
        assert!(users.as_array().unwrap()[0].is_null());
    }

    #[test]
    fn set_below_a_missing_or_scalar_parent_fails_atomically() {
        let store = store();
        let before = store.snapshot();
        let err = store.cursor().prop("nothing").prop("x").set(1).unwrap_err();
        assert!(matches!(err, Error::MissingTarget { .. }));
        let err = store.cursor().prop("count").prop("x").set(1).unwrap_err();
        assert!(matches!(err, Error::Tree(_)));
        assert!(store.snapshot().same(&before));
    }

    #[test]
    fn modify_missing_location() {
        let store = store();
        let err = store
            .cursor()
            .prop("a")
            .prop("b")
            .modify(|v| *v = Value::from(1))
            .unwrap_err();
        assert!(matches!(err, Error::MissingTarget { .. }));
    }

    #[test]
    fn draft_reads_see_uncommitted_changes() {
        let store = store();
        let count = store.cursor().prop("count");
        let seen = std::cell::RefCell::new(None);
        count
            .update(|draft| {
                draft.set(10)?;
                *seen.borrow_mut() = Some((draft.get()?, count.get()?));
                Ok(Outcome::Mutated)
            })
            .unwrap();
        assert_eq!(seen.into_inner(), Some((Value::from(10), Value::from(1))));
    }

    #[test]
    fn recipe_error_is_returned_and_changes_discarded() {
        let store = store();
        let before = store.snapshot();
        let err = store
            .cursor()
            .prop("count")
            .update(|draft| {
                draft.set(99)?;
                Err(Error::msg("boom"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Recipe(_)));
        assert!(store.snapshot().same(&before));
        assert_eq!(store.version(), 0);
        assert!(!store.is_updating());
    }

    #[test]
    fn rollback_is_swallowed() {
        let store = store();
        let before = store.snapshot();
        store
            .cursor()
            .prop("count")
            .update(|draft| {
                draft.set(99)?;
                Err(rollback())
            })
            .unwrap();
        assert!(store.snapshot().same(&before));
    }

    #[test]
    fn nested_rollback_cancels_the_outer_update() {
        let store = store();
        let before = store.snapshot();
        let count = store.cursor().prop("count");
        let users = store.cursor().prop("users");
        count
            .update(|draft| {
                draft.set(2)?;
                users.update(|_| Err(rollback()))?;
                Ok(Outcome::Mutated)
            })
            .unwrap();
        assert!(store.snapshot().same(&before));
    }

    #[test]
    fn readonly_cursors_are_rejected_before_opening_a_draft() {
        let store = store();
        let transformed = store.cursor().prop("users").transform(|v| v.clone());
        let err = transformed.set(1).unwrap_err();
        assert!(matches!(err, Error::ReadonlyTarget { .. }));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn draft_is_unusable_after_the_update() {
        let store = store();
        let escaped = std::cell::RefCell::new(None);
        store
            .cursor()
            .update(|draft| {
                *escaped.borrow_mut() = Some(draft.clone());
                Ok(Outcome::Mutated)
            })
            .unwrap();
        let draft = escaped.into_inner().unwrap();
        assert!(matches!(draft.set(1), Err(Error::StructuralMisuse { .. })));
    }

    #[test]
    fn modify_cannot_be_reentered() {
        let store = store();
        let count = store.cursor().prop("count");
        let result = count.update(|draft| {
            let inner = draft.clone();
            draft.modify(|_| inner.set(5))?
                .map(|_| Outcome::Mutated)
        });
        assert!(matches!(result, Err(Error::StructuralMisuse { .. })));
        assert_eq!(count.get().unwrap(), Value::from(1));
    }

    #[test]
    fn draft_for_foreign_cursor() {
        let engine = Engine::default();
        let a = engine.create_store(Value::from(json!({})));
        let b = engine.create_store(Value::from(json!({})));
        let foreign = b.cursor();
        let err = a
            .cursor()
            .update(|draft| draft.read(&foreign).map(|_| Outcome::Mutated))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { .. }));
    }
}
