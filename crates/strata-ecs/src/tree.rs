//! Parent/child relationships between entities.
//!
//! Each entity has at most one parent and an ordered list of children. The store keeps
//! both directions consistent: `parent_of(c) == Some(p)` exactly when `c` is in
//! `children_of(p)`.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    entity::EntityId,
    error::{EcsError, EcsResult},
    event::{ChildAction, ChildEntitiesChanged},
    store::EntityStore,
};

type ChildList = SmallVec<[EntityId; 8]>;

/// Bidirectional parent/child links.
#[derive(Debug, Default)]
pub(crate) struct Tree {
    parents: FxHashMap<EntityId, EntityId>,
    children: FxHashMap<EntityId, ChildList>,
}

impl Tree {
    pub(crate) fn parent_of(&self, child: EntityId) -> Option<EntityId> {
        self.parents.get(&child).copied()
    }

    pub(crate) fn children_of(&self, parent: EntityId) -> &[EntityId] {
        self.children
            .get(&parent)
            .map(SmallVec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn child_index(&self, parent: EntityId, child: EntityId) -> Option<usize> {
        self.children_of(parent).iter().position(|&c| c == child)
    }

    /// Check if `ancestor` is `entity` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let mut current = Some(entity);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    /// Unlink `child` from its parent. Returns the parent and the index it occupied.
    ///
    /// # Panics
    ///
    /// Panics if the parent's child list does not contain `child`.
    pub(crate) fn detach(&mut self, child: EntityId) -> Option<(EntityId, usize)> {
        let parent = self.parents.remove(&child)?;

        let list = self.children.get_mut(&parent);
        let Some((list, index)) =
            list.and_then(|list| list.iter().position(|&c| c == child).map(|i| (list, i)))
        else {
            panic!("tree corrupted: {child:?} has parent {parent:?} but is not in its child list");
        };

        list.remove(index);
        if list.is_empty() {
            self.children.remove(&parent);
        }

        Some((parent, index))
    }

    /// Link `child` under `parent` at `index`. The child must be detached.
    pub(crate) fn attach(&mut self, parent: EntityId, index: usize, child: EntityId) {
        debug_assert!(!self.parents.contains_key(&child));
        self.parents.insert(child, parent);
        self.children.entry(parent).or_default().insert(index, child);
    }

    /// Drop every link involving `entity`. Returns its former parent slot and its children.
    pub(crate) fn remove_entity(
        &mut self,
        entity: EntityId,
    ) -> (Option<(EntityId, usize)>, ChildList) {
        let slot = self.detach(entity);
        let children = self.children.remove(&entity).unwrap_or_default();
        for child in &children {
            self.parents.remove(child);
        }
        (slot, children)
    }
}

impl EntityStore {
    /// Append `child` to the child list of `parent`, detaching it from any previous parent.
    ///
    /// Returns the index of the child in its new list.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> EcsResult<usize> {
        self.check_link(parent, child)?;

        self.detach_with_event(child);
        let index = self.tree.children_of(parent).len();
        self.link(parent, index, child, ChildAction::Add);
        Ok(index)
    }

    /// Insert `child` into the child list of `parent` at `index`.
    ///
    /// `index` is interpreted after `child` has been removed from its previous list.
    pub fn insert_child(&mut self, parent: EntityId, index: usize, child: EntityId) -> EcsResult<()> {
        self.check_link(parent, child)?;

        let mut len = self.tree.children_of(parent).len();
        if self.tree.parent_of(child) == Some(parent) {
            len -= 1;
        }
        if index > len {
            return Err(EcsError::ChildIndexOutOfRange { parent, index, len });
        }

        self.detach_with_event(child);
        self.link(parent, index, child, ChildAction::Insert);
        Ok(())
    }

    /// Remove `child` from the child list of `parent`, leaving it without a parent.
    ///
    /// Returns `false` if `child` was not a child of `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> EcsResult<bool> {
        self.ensure_alive(parent)?;
        self.ensure_alive(child)?;

        if self.tree.parent_of(child) != Some(parent) {
            return Ok(false);
        }
        self.detach_with_event(child);
        Ok(true)
    }

    /// Parent of `child`, if it has one.
    #[must_use]
    pub fn parent_of(&self, child: EntityId) -> Option<EntityId> {
        self.tree.parent_of(child)
    }

    /// Ordered children of `parent`.
    #[must_use]
    pub fn children_of(&self, parent: EntityId) -> &[EntityId] {
        self.tree.children_of(parent)
    }

    /// Position of `child` in the child list of `parent`.
    pub fn child_index(&self, parent: EntityId, child: EntityId) -> EcsResult<usize> {
        self.tree
            .child_index(parent, child)
            .ok_or(EcsError::NotAChild { parent, child })
    }

    fn check_link(&self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        self.ensure_alive(parent)?;
        self.ensure_alive(child)?;
        if self.tree.is_ancestor_or_self(child, parent) {
            return Err(EcsError::TreeCycle { parent, child });
        }
        Ok(())
    }

    fn link(&mut self, parent: EntityId, index: usize, child: EntityId, action: ChildAction) {
        self.tree.attach(parent, index, child);
        self.events
            .child_entities_changed
            .fire(&ChildEntitiesChanged {
                parent,
                child,
                index,
                action,
            });
    }

    fn detach_with_event(&mut self, child: EntityId) {
        if let Some((parent, index)) = self.tree.detach(child) {
            self.events
                .child_entities_changed
                .fire(&ChildEntitiesChanged {
                    parent,
                    child,
                    index,
                    action: ChildAction::Remove,
                });
        }
    }

    /// Unlink a dying entity from its parent and float its children.
    pub(crate) fn detach_deleted(&mut self, entity: EntityId) {
        let (slot, children) = self.tree.remove_entity(entity);

        if let Some((parent, index)) = slot {
            self.events
                .child_entities_changed
                .fire(&ChildEntitiesChanged {
                    parent,
                    child: entity,
                    index,
                    action: ChildAction::Remove,
                });
        }

        for (index, child) in children.into_iter().enumerate() {
            self.events
                .child_entities_changed
                .fire(&ChildEntitiesChanged {
                    parent: entity,
                    child,
                    index,
                    action: ChildAction::Remove,
                });
        }
    }
}
