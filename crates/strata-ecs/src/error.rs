//! Error types for schema registration and store operations.

use thiserror::Error;

use crate::{
    component::{ComponentId, TagId},
    entity::EntityId,
};

/// Failures raised while building a [`Schema`](crate::Schema) or resolving a type against it.
///
/// These are raised once at registration time and are fatal to the initialization path
/// that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The type owns heap data or has drop glue, so it cannot live in a column.
    #[error("component `{0}` is not a plain value type")]
    NotPlainValue(&'static str),

    /// Tags must be zero-sized markers.
    #[error("tag `{0}` is not zero-sized")]
    TagNotZeroSized(&'static str),

    /// The component index space is exhausted.
    #[error("cannot register component `{name}`: limit of {max} component types reached")]
    TooManyComponents {
        /// Type that failed to register.
        name: &'static str,
        /// Configured upper bound.
        max: usize,
    },

    /// The tag index space is exhausted.
    #[error("cannot register tag `{name}`: limit of {max} tag types reached")]
    TooManyTags {
        /// Type that failed to register.
        name: &'static str,
        /// Upper bound.
        max: usize,
    },

    /// The component type was never registered in the schema.
    #[error("component `{0}` is not registered in the schema")]
    UnregisteredComponent(&'static str),

    /// The tag type was never registered in the schema.
    #[error("tag `{0}` is not registered in the schema")]
    UnregisteredTag(&'static str),

    /// A component was registered twice with different index kinds.
    #[error("component `{0}` is already registered with a different index kind")]
    IndexConflict(&'static str),

    /// A signature names a component id outside the schema.
    #[error("{0:?} is not part of the schema")]
    UnknownComponentId(ComponentId),

    /// A signature names a tag id outside the schema.
    #[error("{0:?} is not part of the schema")]
    UnknownTagId(TagId),
}

/// A command that failed during [`CommandBuffer::playback`](crate::CommandBuffer::playback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// Position of the command in the recorded log.
    pub position: usize,
    /// Entity the command targeted.
    pub entity: EntityId,
    /// What went wrong.
    pub error: EcsError,
}

/// Errors surfaced by [`EntityStore`](crate::EntityStore) operations.
///
/// All of these are recoverable. Corrupted internal bookkeeping is reported by panicking
/// instead, since there is nothing a caller could do to repair it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// Schema lookup failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Id 0 and ids above [`EntityId::MAX`] never name an entity.
    #[error("entity id {0} is reserved")]
    InvalidEntityId(EntityId),

    /// No live entity has this id.
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// `create_entity_with_id` was given an id that is already alive.
    #[error("entity {0} already exists")]
    DuplicateEntityId(EntityId),

    /// Column access for a component that the archetype does not store.
    #[error("component {component:?} is not part of archetype {archetype}")]
    ComponentNotInArchetype {
        /// Requested component.
        component: ComponentId,
        /// Raw id of the archetype that was asked.
        archetype: u32,
    },

    /// The entity does not have the component.
    #[error("entity {entity} has no component `{name}`")]
    ComponentNotFound {
        /// Entity that was asked.
        entity: EntityId,
        /// Component type name.
        name: &'static str,
    },

    /// The component has no index attached.
    #[error("component `{0}` is not indexed")]
    NotIndexed(&'static str),

    /// The index kind attached to the component does not support the lookup.
    #[error("{operation} is not supported by the {kind} index of `{name}`")]
    NotSupportedByIndex {
        /// Lookup that was attempted.
        operation: &'static str,
        /// Index kind attached to the component.
        kind: &'static str,
        /// Component type name.
        name: &'static str,
    },

    /// No archetype with this id exists in the store.
    #[error("archetype {0} not found")]
    ArchetypeNotFound(u32),

    /// The requested parent/child link would make an entity its own ancestor.
    #[error("entity {child} cannot become a child of {parent}: it would be its own ancestor")]
    TreeCycle {
        /// Would-be parent.
        parent: EntityId,
        /// Would-be child.
        child: EntityId,
    },

    /// `child` is not a child of `parent`.
    #[error("entity {child} is not a child of {parent}")]
    NotAChild {
        /// Parent that was asked.
        parent: EntityId,
        /// Entity that is not in its child list.
        child: EntityId,
    },

    /// `insert_child` index beyond the child list.
    #[error("child index {index} out of range for {len} children of {parent}")]
    ChildIndexOutOfRange {
        /// Parent entity.
        parent: EntityId,
        /// Requested position.
        index: usize,
        /// Current number of children.
        len: usize,
    },

    /// Chunks are per-archetype; value predicates select individual rows.
    #[error("value predicates cannot be combined with chunk iteration")]
    ValueFilterOnChunks,

    /// Writing through a mutable borrow would bypass the component index.
    #[error("component `{0}` is indexed; update it with set_component")]
    IndexedComponentMutation(&'static str),

    /// The same component type appears twice in a chunk tuple.
    #[error("component `{0}` requested more than once")]
    DuplicateQueryComponent(&'static str),

    /// A query or command buffer was used with a store built on a different schema.
    #[error("the store was built on a different schema")]
    SchemaMismatch,

    /// One or more commands failed during playback. The others were applied.
    #[error("{} command(s) failed during playback", .0.len())]
    Playback(Vec<CommandFailure>),
}

/// Result type for store operations.
pub type EcsResult<T> = Result<T, EcsError>;
