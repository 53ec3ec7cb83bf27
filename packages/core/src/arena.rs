//! Path descriptors, stored in a per-store arena.
//!
//! Descriptors refer to their parent and children by index, never by
//! pointer. Key steps are interned per parent, so deriving the same key from
//! the same descriptor always yields the same id. Call and transform steps
//! are never interned: every derivation creates a fresh descriptor.
//!
//! Descriptors that are not addressable live only as long as some cursor
//! refers to them. Each one is owned by a [`Lease`] shared by its cursors;
//! dropping the last one frees the slot for reuse.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::store::StoreInner;
use crate::{SafeRead, Step};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CursorId(usize);

impl CursorId {
    pub(crate) const ROOT: CursorId = CursorId(0);
}

/// Which memo slot a read uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Strict,
    Safe,
}

impl Mode {
    fn slot(self) -> usize {
        match self {
            Mode::Strict => 0,
            Mode::Safe => 1,
        }
    }
}

#[derive(Clone, Debug)]
struct Memo {
    version: u64,
    result: SafeRead,
}

pub(crate) struct Node {
    pub(crate) parent: Option<CursorId>,
    pub(crate) steps: Vec<Step>,
    /// Some step in the chain is a call.
    pub(crate) functional: bool,
    /// Every step in the chain is a key.
    pub(crate) addressable: bool,
    /// Some call in the chain reads a cursor whose value does not follow
    /// this store's version, so results cannot be memoized.
    pub(crate) external: bool,
    children: HashMap<cursorstore_tree::Key, CursorId>,
    memo: [Option<Memo>; 2],
    lease: Weak<Lease>,
}

impl Node {
    fn vacant() -> Self {
        Node {
            parent: None,
            steps: Vec::new(),
            functional: false,
            addressable: true,
            external: false,
            children: HashMap::new(),
            memo: [None, None],
            lease: Weak::new(),
        }
    }
}

pub(crate) struct Arena {
    nodes: Vec<Node>,
    free: Vec<CursorId>,
}

impl Arena {
    /// An arena holding only the root descriptor.
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::vacant()],
            free: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: CursorId) -> &Node {
        &self.nodes[id.0]
    }

    /// Slots in use or free.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Slots in use.
    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// The descriptor reached from `parent` by `step`.
    ///
    /// `external` marks a call step whose context is a cursor of another
    /// store (or itself external); it is inherited by every descendant.
    pub(crate) fn child(&mut self, parent: CursorId, step: Step, external: bool) -> CursorId {
        if let Step::Key(key) = &step {
            if let Some(&existing) = self.nodes[parent.0].children.get(key) {
                return existing;
            }
        }

        let parent_node = &self.nodes[parent.0];
        let functional = parent_node.functional || step.is_call();
        let addressable = parent_node.addressable && step.is_addressable();
        let external = parent_node.external || external;
        let mut steps = parent_node.steps.clone();
        let key = step.as_key().cloned();
        steps.push(step);
        let node = Node {
            parent: Some(parent),
            steps,
            functional,
            addressable,
            external,
            ..Node::vacant()
        };

        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                CursorId(self.nodes.len() - 1)
            }
        };
        if let Some(key) = key {
            self.nodes[parent.0].children.insert(key, id);
        }
        tracing::trace!(id = id.0, parent = parent.0, "created path descriptor");
        id
    }

    /// The lease owning `id`, created if no cursor holds one. Addressable
    /// descriptors are never released and have no lease.
    pub(crate) fn lease(
        &mut self,
        store: &Rc<StoreInner>,
        id: CursorId,
        parent: Option<Rc<Lease>>,
    ) -> Option<Rc<Lease>> {
        let node = &mut self.nodes[id.0];
        if node.addressable {
            return None;
        }
        if let Some(lease) = node.lease.upgrade() {
            return Some(lease);
        }
        let lease = Rc::new(Lease {
            store: Rc::downgrade(store),
            id,
            parent,
        });
        node.lease = Rc::downgrade(&lease);
        Some(lease)
    }

    /// Free the slot of `id`. The removed descriptor is returned so it can
    /// be dropped once the arena is no longer borrowed: its steps may hold
    /// cursors of this store.
    pub(crate) fn release(&mut self, id: CursorId) -> Node {
        let node = std::mem::replace(&mut self.nodes[id.0], Node::vacant());
        if let (Some(parent), Some(Step::Key(key))) = (node.parent, node.steps.last()) {
            let children = &mut self.nodes[parent.0].children;
            if children.get(key) == Some(&id) {
                children.remove(key);
            }
        }
        self.free.push(id);
        tracing::trace!(id = id.0, "released path descriptor");
        node
    }

    pub(crate) fn memo(&self, id: CursorId, mode: Mode, version: u64) -> Option<SafeRead> {
        match &self.nodes[id.0].memo[mode.slot()] {
            Some(memo) if memo.version == version => Some(memo.result.clone()),
            _ => None,
        }
    }

    pub(crate) fn remember(&mut self, id: CursorId, mode: Mode, version: u64, result: SafeRead) {
        self.nodes[id.0].memo[mode.slot()] = Some(Memo { version, result });
    }
}

/// Keeps a descriptor that is not addressable alive.
///
/// Shared by every cursor handle of that descriptor, and by the leases of
/// descriptors derived from it.
pub(crate) struct Lease {
    store: Weak<StoreInner>,
    id: CursorId,
    parent: Option<Rc<Lease>>,
}

impl Lease {
    pub(crate) fn parent(&self) -> Option<Rc<Lease>> {
        self.parent.clone()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let released = match store.arena.try_borrow_mut() {
            Ok(mut arena) => Some(arena.release(self.id)),
            Err(_) => {
                store.released.borrow_mut().push(self.id);
                None
            }
        };
        drop(released);
    }
}
