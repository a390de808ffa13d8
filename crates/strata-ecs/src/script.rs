//! Scripts - per-entity behaviour objects.
//!
//! Components are plain values stored in columns. Anything that owns heap data or
//! resources (state machines, handles, buffers) is attached as a script instead. Each
//! entity holds at most one script per type; scripts live outside the archetype tables
//! and do not affect the signature.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    entity::EntityId,
    error::EcsResult,
    event::{ScriptAction, ScriptChanged},
    store::EntityStore,
};

/// Marker trait for types that can be attached to an entity as a script.
///
/// ```
/// use strata_ecs::Script;
///
/// struct Patrol {
///     waypoints: Vec<(f32, f32)>,
///     next: usize,
/// }
///
/// impl Script for Patrol {}
/// ```
pub trait Script: Send + Sync + 'static {}

/// Type-erased script value.
struct ScriptEntry {
    type_id: TypeId,
    name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl ScriptEntry {
    fn new<S: Script>(value: S) -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
            value: Box::new(value),
        }
    }

    fn into_inner<S: Script>(self) -> Option<S> {
        self.value.downcast().ok().map(|b| *b)
    }
}

/// Scripts of every entity in a store.
#[derive(Default)]
pub(crate) struct Scripts {
    entries: FxHashMap<EntityId, SmallVec<[ScriptEntry; 2]>>,
}

impl Scripts {
    /// Attach `value`, returning the script of the same type it replaced.
    fn insert<S: Script>(&mut self, entity: EntityId, value: S) -> Option<S> {
        let list = self.entries.entry(entity).or_default();
        let entry = ScriptEntry::new(value);

        match list.iter_mut().find(|e| e.type_id == entry.type_id) {
            Some(slot) => std::mem::replace(slot, entry).into_inner(),
            None => {
                list.push(entry);
                None
            }
        }
    }

    fn remove<S: Script>(&mut self, entity: EntityId) -> Option<S> {
        let list = self.entries.get_mut(&entity)?;
        let pos = list.iter().position(|e| e.type_id == TypeId::of::<S>())?;
        let entry = list.remove(pos);
        if list.is_empty() {
            self.entries.remove(&entity);
        }
        entry.into_inner()
    }

    fn get<S: Script>(&self, entity: EntityId) -> Option<&S> {
        self.entries
            .get(&entity)?
            .iter()
            .find(|e| e.type_id == TypeId::of::<S>())
            .and_then(|e| e.value.downcast_ref())
    }

    fn get_mut<S: Script>(&mut self, entity: EntityId) -> Option<&mut S> {
        self.entries
            .get_mut(&entity)?
            .iter_mut()
            .find(|e| e.type_id == TypeId::of::<S>())
            .and_then(|e| e.value.downcast_mut())
    }

    fn names(&self, entity: EntityId) -> Vec<&'static str> {
        self.entries
            .get(&entity)
            .map(|list| list.iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    /// Drop every script of `entity`, returning their type names.
    pub(crate) fn remove_entity(&mut self, entity: EntityId) -> Vec<&'static str> {
        self.entries
            .remove(&entity)
            .map(|list| list.into_iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(SmallVec::len).sum()
    }
}

impl std::fmt::Debug for Scripts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scripts")
            .field("entities", &self.entries.len())
            .field("scripts", &self.len())
            .finish()
    }
}

impl EntityStore {
    /// Attach `script` to `entity`.
    ///
    /// A script of the same type is replaced and returned.
    pub fn add_script<S: Script>(&mut self, entity: EntityId, script: S) -> EcsResult<Option<S>> {
        self.ensure_alive(entity)?;

        let previous = self.scripts.insert(entity, script);
        let action = if previous.is_some() {
            ScriptAction::Replace
        } else {
            ScriptAction::Add
        };
        self.events.script_changed(ScriptChanged {
            entity,
            script: std::any::type_name::<S>(),
            action,
        });

        Ok(previous)
    }

    /// Detach and return the script of type `S`.
    pub fn remove_script<S: Script>(&mut self, entity: EntityId) -> EcsResult<Option<S>> {
        self.ensure_alive(entity)?;

        let removed = self.scripts.remove::<S>(entity);
        if removed.is_some() {
            self.events.script_changed(ScriptChanged {
                entity,
                script: std::any::type_name::<S>(),
                action: ScriptAction::Remove,
            });
        }
        Ok(removed)
    }

    /// Get the script of type `S`.
    #[must_use]
    pub fn get_script<S: Script>(&self, entity: EntityId) -> Option<&S> {
        self.scripts.get(entity)
    }

    /// Get the script of type `S` mutably.
    #[must_use]
    pub fn get_script_mut<S: Script>(&mut self, entity: EntityId) -> Option<&mut S> {
        self.scripts.get_mut(entity)
    }

    /// Type names of the scripts attached to `entity`, in attach order.
    #[must_use]
    pub fn scripts_of(&self, entity: EntityId) -> Vec<&'static str> {
        self.scripts.names(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Patrol {
        waypoints: Vec<u32>,
    }
    impl Script for Patrol {}

    #[derive(Debug, PartialEq)]
    struct Label(String);
    impl Script for Label {}

    fn e(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn test_insert_replaces_same_type() {
        let mut scripts = Scripts::default();

        assert_eq!(scripts.insert(e(1), Label("a".into())), None);
        assert_eq!(
            scripts.insert(e(1), Label("b".into())),
            Some(Label("a".into()))
        );
        assert_eq!(scripts.get::<Label>(e(1)), Some(&Label("b".into())));
        assert_eq!(scripts.len(), 1);
    }

    #[test]
    fn test_scripts_are_per_type() {
        let mut scripts = Scripts::default();
        scripts.insert(e(1), Label("a".into()));
        scripts.insert(
            e(1),
            Patrol {
                waypoints: vec![1, 2],
            },
        );

        scripts.get_mut::<Patrol>(e(1)).unwrap().waypoints.push(3);
        assert_eq!(scripts.get::<Patrol>(e(1)).unwrap().waypoints, [1, 2, 3]);
        assert_eq!(scripts.names(e(1)).len(), 2);

        assert!(scripts.remove::<Label>(e(1)).is_some());
        assert!(scripts.get::<Label>(e(1)).is_none());
        assert!(scripts.remove::<Label>(e(1)).is_none());
    }

    #[test]
    fn test_remove_entity_drops_all() {
        let mut scripts = Scripts::default();
        scripts.insert(e(1), Label("a".into()));
        scripts.insert(e(2), Label("b".into()));

        assert_eq!(scripts.remove_entity(e(1)).len(), 1);
        assert!(scripts.names(e(1)).is_empty());
        assert_eq!(scripts.len(), 1);
    }
}
