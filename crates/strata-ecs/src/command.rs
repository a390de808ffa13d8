//! Deferred structural changes.
//!
//! A [`CommandBuffer`] records component, tag and entity operations without touching
//! the store, then applies them in record order on [`playback`](CommandBuffer::playback).
//! This is how structural changes are made while the store is borrowed, for example
//! during chunk iteration:
//!
//! ```
//! use strata_ecs::{Component, EntityStore, Schema};
//!
//! #[derive(Component, Default, Clone, Copy, Debug, PartialEq)]
//! struct Health(i32);
//!
//! #[derive(Component, Default, Clone, Copy)]
//! struct Dead;
//!
//! let mut builder = Schema::builder();
//! builder.component::<Health>().unwrap();
//! builder.component::<Dead>().unwrap();
//! let mut store = EntityStore::new(builder.build());
//!
//! let e = store.create_entity();
//! store.add_component(e, Health(0)).unwrap();
//!
//! let query = store.query().with::<Health>().build().unwrap();
//! let mut commands = store.command_buffer();
//! for chunk in query.chunks::<(Health,)>(&store).unwrap() {
//!     for (&entity, health) in chunk.entities.iter().zip(chunk.components.0) {
//!         if health.0 <= 0 {
//!             commands.add_component(entity, Dead).unwrap();
//!         }
//!     }
//! }
//! commands.playback(&mut store).unwrap();
//! assert!(store.has_component::<Dead>(e));
//! ```
//!
//! Commands are applied through the store's public operations, so they fire the same
//! events. Handlers cannot reach the store or the buffer while a playback runs, so a
//! playback can never start another playback on the same store.

use std::{fmt, sync::Arc};

use tracing::{trace, warn};

use crate::{
    component::{Component, ComponentId, Tag},
    entity::{EntityId, IdReserver},
    error::{CommandFailure, EcsError, EcsResult},
    schema::Schema,
    store::EntityStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteMode {
    Add,
    Set,
}

/// A component value waiting for playback.
trait PendingValue: Send + Sync {
    fn apply(self: Box<Self>, store: &mut EntityStore, entity: EntityId, mode: WriteMode)
    -> EcsResult<()>;
}

struct Pending<T>(T);

impl<T: Component> PendingValue for Pending<T> {
    fn apply(
        self: Box<Self>,
        store: &mut EntityStore,
        entity: EntityId,
        mode: WriteMode,
    ) -> EcsResult<()> {
        match mode {
            WriteMode::Add => store.add_component(entity, self.0).map(drop),
            WriteMode::Set => store.set_component(entity, self.0),
        }
    }
}

type StoreOp = fn(&mut EntityStore, EntityId) -> EcsResult<()>;

/// One recorded operation.
enum Command {
    CreateEntity(EntityId),
    DeleteEntity(EntityId),
    AddComponent {
        entity: EntityId,
        component: ComponentId,
        value: Box<dyn PendingValue>,
    },
    SetComponent {
        entity: EntityId,
        component: ComponentId,
        value: Box<dyn PendingValue>,
    },
    RemoveComponent {
        entity: EntityId,
        component: ComponentId,
        op: StoreOp,
    },
    AddTag {
        entity: EntityId,
        op: StoreOp,
    },
    RemoveTag {
        entity: EntityId,
        op: StoreOp,
    },
}

impl Command {
    const fn entity(&self) -> EntityId {
        match self {
            Self::CreateEntity(entity)
            | Self::DeleteEntity(entity)
            | Self::AddComponent { entity, .. }
            | Self::SetComponent { entity, .. }
            | Self::RemoveComponent { entity, .. }
            | Self::AddTag { entity, .. }
            | Self::RemoveTag { entity, .. } => *entity,
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::CreateEntity(_) => "create_entity",
            Self::DeleteEntity(_) => "delete_entity",
            Self::AddComponent { .. } => "add_component",
            Self::SetComponent { .. } => "set_component",
            Self::RemoveComponent { .. } => "remove_component",
            Self::AddTag { .. } => "add_tag",
            Self::RemoveTag { .. } => "remove_tag",
        }
    }

    fn apply(self, store: &mut EntityStore) -> EcsResult<()> {
        match self {
            Self::CreateEntity(entity) => store.create_entity_with_id(entity).map(drop),
            Self::DeleteEntity(entity) => store.delete_entity(entity),
            Self::AddComponent { entity, value, .. } => value.apply(store, entity, WriteMode::Add),
            Self::SetComponent { entity, value, .. } => value.apply(store, entity, WriteMode::Set),
            Self::RemoveComponent { entity, op, .. }
            | Self::AddTag { entity, op }
            | Self::RemoveTag { entity, op } => op(store, entity),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name(), self.entity())
    }
}

/// Outcome of a successful playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Commands applied to the store.
    pub applied: usize,
    /// Set commands folded into a pending add while recording.
    pub coalesced: usize,
}

/// Ordered log of deferred store operations.
///
/// Created with [`EntityStore::command_buffer`]. Types are resolved against the schema
/// when a command is recorded, so an unregistered type fails right away.
pub struct CommandBuffer {
    schema: Arc<Schema>,
    reserver: IdReserver,
    commands: Vec<Command>,
    coalesced: usize,
}

impl CommandBuffer {
    pub(crate) fn new(schema: Arc<Schema>, reserver: IdReserver) -> Self {
        Self {
            schema,
            reserver,
            commands: Vec::new(),
            coalesced: 0,
        }
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every recorded command.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.coalesced = 0;
    }

    /// Record the creation of an entity and return its id.
    ///
    /// The id is reserved immediately, so later commands in this buffer can target it.
    ///
    /// # Panics
    ///
    /// Panics if every fresh id up to [`EntityId::MAX`] has been handed out.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.reserver.reserve();
        self.commands.push(Command::CreateEntity(entity));
        entity
    }

    /// Record the deletion of `entity`.
    pub fn delete_entity(&mut self, entity: EntityId) {
        self.commands.push(Command::DeleteEntity(entity));
    }

    /// Record adding (or overwriting) a component.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> EcsResult<()> {
        let component = self.schema.component_id::<T>()?;
        self.commands.push(Command::AddComponent {
            entity,
            component,
            value: Box::new(Pending(value)),
        });
        Ok(())
    }

    /// Record overwriting an existing component.
    ///
    /// If the last command recorded for `entity` adds the same component, the value is
    /// folded into that add instead.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> EcsResult<()> {
        let component = self.schema.component_id::<T>()?;

        let last_for_entity = self
            .commands
            .iter_mut()
            .rev()
            .find(|command| command.entity() == entity);

        if let Some(Command::AddComponent {
            component: pending,
            value: slot,
            ..
        }) = last_for_entity
        {
            if *pending == component {
                *slot = Box::new(Pending(value));
                self.coalesced += 1;
                trace!(%entity, component = component.as_raw(), "coalesced set into pending add");
                return Ok(());
            }
        }

        self.commands.push(Command::SetComponent {
            entity,
            component,
            value: Box::new(Pending(value)),
        });
        Ok(())
    }

    /// Record removing a component.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> EcsResult<()> {
        let component = self.schema.component_id::<T>()?;
        self.commands.push(Command::RemoveComponent {
            entity,
            component,
            op: |store, entity| store.remove_component::<T>(entity).map(drop),
        });
        Ok(())
    }

    /// Record adding a tag.
    pub fn add_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<()> {
        self.schema.tag_id::<T>()?;
        self.commands.push(Command::AddTag {
            entity,
            op: |store, entity| store.add_tag::<T>(entity).map(drop),
        });
        Ok(())
    }

    /// Record removing a tag.
    pub fn remove_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<()> {
        self.schema.tag_id::<T>()?;
        self.commands.push(Command::RemoveTag {
            entity,
            op: |store, entity| store.remove_tag::<T>(entity).map(drop),
        });
        Ok(())
    }

    /// Apply every recorded command to `store` in record order and clear the buffer.
    ///
    /// The buffer must be played back into the store that created it; a store built on a
    /// different schema is rejected with [`EcsError::SchemaMismatch`] before anything is
    /// applied. A failing command does not stop the playback. If any command failed, the
    /// failures are returned together as [`EcsError::Playback`]; all other commands
    /// have been applied.
    pub fn playback(&mut self, store: &mut EntityStore) -> EcsResult<PlaybackStats> {
        if !Arc::ptr_eq(&self.schema, store.schema()) {
            return Err(EcsError::SchemaMismatch);
        }
        let coalesced = std::mem::take(&mut self.coalesced);
        if self.commands.is_empty() {
            return Ok(PlaybackStats {
                applied: 0,
                coalesced,
            });
        }

        let mut applied = 0;
        let mut failures = Vec::new();

        for (position, command) in self.commands.drain(..).enumerate() {
            let entity = command.entity();
            let name = command.name();
            match command.apply(store) {
                Ok(()) => applied += 1,
                Err(error) => {
                    warn!(position, %entity, command = name, %error, "command failed during playback");
                    failures.push(CommandFailure {
                        position,
                        entity,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(PlaybackStats { applied, coalesced })
        } else {
            Err(EcsError::Playback(failures))
        }
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.commands)
            .field("coalesced", &self.coalesced)
            .finish()
    }
}
